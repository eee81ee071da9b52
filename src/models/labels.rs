/// COCO label for a 1-based TF object detection class id (90 ids, 80 used).
pub fn coco_label(class_id: u32) -> Option<&'static str> {
    match class_id {
        1 => Some("person"),
        2 => Some("bicycle"),
        3 => Some("car"),
        4 => Some("motorcycle"),
        5 => Some("airplane"),
        6 => Some("bus"),
        7 => Some("train"),
        8 => Some("truck"),
        9 => Some("boat"),
        10 => Some("traffic light"),
        11 => Some("fire hydrant"),
        13 => Some("stop sign"),
        14 => Some("parking meter"),
        15 => Some("bench"),
        16 => Some("bird"),
        17 => Some("cat"),
        18 => Some("dog"),
        19 => Some("horse"),
        20 => Some("sheep"),
        21 => Some("cow"),
        22 => Some("elephant"),
        23 => Some("bear"),
        24 => Some("zebra"),
        25 => Some("giraffe"),
        27 => Some("backpack"),
        28 => Some("umbrella"),
        31 => Some("handbag"),
        32 => Some("tie"),
        33 => Some("suitcase"),
        34 => Some("frisbee"),
        35 => Some("skis"),
        36 => Some("snowboard"),
        37 => Some("sports ball"),
        38 => Some("kite"),
        39 => Some("baseball bat"),
        40 => Some("baseball glove"),
        41 => Some("skateboard"),
        42 => Some("surfboard"),
        43 => Some("tennis racket"),
        44 => Some("bottle"),
        46 => Some("wine glass"),
        47 => Some("cup"),
        48 => Some("fork"),
        49 => Some("knife"),
        50 => Some("spoon"),
        51 => Some("bowl"),
        52 => Some("banana"),
        53 => Some("apple"),
        54 => Some("sandwich"),
        55 => Some("orange"),
        56 => Some("broccoli"),
        57 => Some("carrot"),
        58 => Some("hot dog"),
        59 => Some("pizza"),
        60 => Some("donut"),
        61 => Some("cake"),
        62 => Some("chair"),
        63 => Some("couch"),
        64 => Some("potted plant"),
        65 => Some("bed"),
        67 => Some("dining table"),
        70 => Some("toilet"),
        72 => Some("tv"),
        73 => Some("laptop"),
        74 => Some("mouse"),
        75 => Some("remote"),
        76 => Some("keyboard"),
        77 => Some("cell phone"),
        78 => Some("microwave"),
        79 => Some("oven"),
        80 => Some("toaster"),
        81 => Some("sink"),
        82 => Some("refrigerator"),
        84 => Some("book"),
        85 => Some("clock"),
        86 => Some("vase"),
        87 => Some("scissors"),
        88 => Some("teddy bear"),
        89 => Some("hair drier"),
        90 => Some("toothbrush"),
        _ => None,
    }
}
