use serde::Serialize;

/// One media segment listed by a manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Play duration in seconds, as declared by `#EXTINF`.
    pub duration: f32,
    pub title: String,
    pub uri: String,
}

impl Segment {
    pub fn new(duration: f32, title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            duration,
            title: title.into(),
            uri: uri.into(),
        }
    }
}
