use crate::utils::error::DetectError;
use crate::Result;
use axum::async_trait;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::StatusCode;
use std::path::Path;

/// Name of the multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

const ALLOWED_TYPES: [&str; 4] = ["jpeg", "jpg", "png", "gif"];

/// `Multipart` extractor that rejects with the JSON error body.
///
/// A body that is not `multipart/form-data` at all carries no image file.
pub struct ImageForm(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for ImageForm
where
    S: Send + Sync,
{
    type Rejection = DetectError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        Multipart::from_request(req, state)
            .await
            .map(ImageForm)
            .map_err(|rejection| {
                tracing::debug!("Rejected non-multipart upload: {}", rejection);
                DetectError::InvalidInput("No image file provided".to_string())
            })
    }
}

/// An accepted image upload.
#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl ImageUpload {
    /// Pull the `image` field out of the form, validating type and size.
    ///
    /// An empty file is passed on as is; the pipeline answers it with the
    /// fallback result.
    pub async fn from_multipart(mut multipart: Multipart, max_size: usize) -> Result<Self> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| read_error(e, max_size, max_size, "Failed to read multipart field"))?
        {
            let field_name = field.name().unwrap_or("unknown").to_string();
            if field_name != IMAGE_FIELD {
                tracing::debug!("Ignoring unknown field: {}", field_name);
                continue;
            }

            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            check_file_type(&file_name, &content_type)?;

            let data = read_limited(field, max_size).await?;

            return Ok(Self {
                file_name,
                content_type,
                data,
            });
        }

        Err(DetectError::InvalidInput("No image file provided".to_string()))
    }
}

/// Both the MIME type and the file extension must name an allowed image type.
pub fn check_file_type(file_name: &str, content_type: &str) -> Result<()> {
    let mime = content_type.to_ascii_lowercase();
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let mime_ok = ALLOWED_TYPES.iter().any(|t| mime.contains(t));
    let extension_ok = ALLOWED_TYPES.iter().any(|t| extension.contains(t));

    if mime_ok && extension_ok {
        Ok(())
    } else {
        tracing::debug!(
            "Rejected upload '{}' with content type '{}'",
            file_name,
            content_type
        );
        Err(DetectError::UploadRejected(
            "Only image files are allowed!".to_string(),
        ))
    }
}

async fn read_limited(mut field: Field<'_>, max_size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| read_error(e, data.len(), max_size, "Failed to read file data"))?
    {
        if data.len() + chunk.len() > max_size {
            return Err(DetectError::FileTooLarge(data.len() + chunk.len(), max_size));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

/// The request body limit surfaces as a multipart read error.
fn read_error(error: MultipartError, received: usize, max_size: usize, context: &str) -> DetectError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DetectError::FileTooLarge(received, max_size)
    } else {
        DetectError::InvalidInput(format!("{}: {}", context, error))
    }
}
