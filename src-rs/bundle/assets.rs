use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::annotation::{render, Annotation};

/// Raw image bytes recovered from a `<prefix>;base64,<payload>` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

const BASE64_MARKER: &str = ";base64,";

/// Split a screenshot data URL into its encoding name and bytes.
///
/// Only the prefix `data:image/<name>` is interpreted; any other prefix is
/// kept as opaque binary with a `bin` extension. `None` means the payload is
/// not usable at all.
pub fn decode_data_url(data_url: &str) -> Option<DecodedImage> {
    let (prefix, payload) = data_url.trim().split_once(BASE64_MARKER)?;
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let bytes = match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("screenshot payload is not valid base64: {err}");
            return None;
        }
    };
    Some(DecodedImage {
        extension: extension_for(prefix),
        bytes,
    })
}

fn extension_for(prefix: &str) -> String {
    let subtype = prefix
        .strip_prefix("data:image/")
        .map(|rest| rest.split('+').next().unwrap_or(rest).to_ascii_lowercase());
    match subtype {
        Some(name) if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) => name,
        _ => "bin".to_string(),
    }
}

pub fn encode_data_url(image: &DecodedImage) -> String {
    let mime = if image.extension == "bin" {
        "application/octet-stream".to_string()
    } else {
        format!("image/{}", image.extension)
    };
    format!("data:{mime}{BASE64_MARKER}{}", STANDARD.encode(&image.bytes))
}

/// Bundle path of the screenshot for the step at zero-based `index`.
pub fn asset_path(index: usize, extension: &str) -> String {
    format!("images/step-{}-screenshot.{extension}", index + 1)
}

/// Paint `annotations` into the screenshot and re-encode it as PNG. When the
/// screenshot cannot be decoded the original bytes are kept.
pub fn burn_annotations(image: DecodedImage, annotations: &[Annotation]) -> DecodedImage {
    if annotations.is_empty() {
        return image;
    }
    let Some(composed) = render::compose(&image.bytes, annotations) else {
        return image;
    };
    match render::encode_png(&composed) {
        Ok(bytes) => DecodedImage {
            extension: "png".to_string(),
            bytes,
        },
        Err(err) => {
            debug!("failed to re-encode annotated screenshot: {err}");
            image
        }
    }
}
