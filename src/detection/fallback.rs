use crate::detection::{Detection, DetectionResult};
use rand::Rng;

/// Synthetic result returned when detection fails: a person and a dog at
/// fixed base positions, shifted by one shared random offset, with
/// confidences just under fixed ceilings.
pub fn fallback_detections<R: Rng + ?Sized>(rng: &mut R) -> DetectionResult {
    let x_offset = rng.gen_range(0..50) as f32;
    let y_offset = rng.gen_range(0..50) as f32;

    vec![
        Detection {
            object: "person".to_string(),
            confidence: 0.95 - rng.gen::<f32>() * 0.1,
            bounding_box: [10.0 + x_offset, 10.0 + y_offset, 100.0, 200.0],
        },
        Detection {
            object: "dog".to_string(),
            confidence: 0.85 - rng.gen::<f32>() * 0.1,
            bounding_box: [150.0 + x_offset, 50.0 + y_offset, 80.0, 80.0],
        },
    ]
}
