//! Request types for multimodal inference.

use std::sync::Arc;

/// Resolution hint passed along with an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageDetail {
    /// Coarse view, cheaper and faster.
    Low,
    /// Full resolution.
    High,
    /// Let the service decide.
    #[default]
    Auto,
}

impl ImageDetail {
    /// Wire name of the detail level.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

/// One piece of a request, sent in order.
#[derive(Debug, Clone)]
pub enum ContentPart {
    /// Plain instruction or marker text.
    Text(String),
    /// Encoded image bytes (PNG, JPEG, ...).
    Image {
        data: Arc<[u8]>,
        detail: ImageDetail,
    },
}

impl ContentPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    /// Create an image part.
    pub fn image(data: Arc<[u8]>, detail: ImageDetail) -> Self {
        ContentPart::Image { data, detail }
    }

    /// Get the text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(text) => Some(text),
            ContentPart::Image { .. } => None,
        }
    }

    /// Whether this part carries an image.
    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }
}

/// A single-turn question about a set of images.
///
/// The service sees the parts exactly in the order they were pushed, which is
/// the only way it can relate a text marker to the image that follows it.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    /// Ordered content parts.
    pub parts: Vec<ContentPart>,
    /// Ask the service to answer with a JSON object.
    pub json_response: bool,
}

impl InferenceRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty request that expects a JSON object back.
    pub fn json() -> Self {
        Self {
            parts: Vec::new(),
            json_response: true,
        }
    }

    /// Append a text part.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Append an image part.
    pub fn with_image(mut self, data: Arc<[u8]>, detail: ImageDetail) -> Self {
        self.push_image(data, detail);
        self
    }

    /// Append a text part in place.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.parts.push(ContentPart::text(text));
    }

    /// Append an image part in place.
    pub fn push_image(&mut self, data: Arc<[u8]>, detail: ImageDetail) {
        self.parts.push(ContentPart::image(data, detail));
    }

    /// Number of image parts.
    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_image()).count()
    }

    /// Iterate over the text parts in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(ContentPart::as_text)
    }
}

/// Guess the MIME type of encoded image bytes, defaulting to PNG.
pub fn sniff_mime_type(data: &[u8]) -> &'static str {
    image::guess_format(data)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/png")
}
