//! Named defaults and limits shared across the engine

/// Default values for node settings and engine configuration
pub mod defaults {
    /// Snapshots kept by the undo history
    pub const HISTORY_LIMIT: usize = 100;
    /// Pending commands buffered before senders wait
    pub const COMMAND_BUFFER: usize = 32;

    pub const IMAGE_ASPECT_RATIO: &str = "1:1";
    pub const IMAGE_RESOLUTION: &str = "1K";
    pub const VIDEO_ASPECT_RATIO: &str = "16:9";
    pub const VIDEO_DURATION_SECONDS: u32 = 8;
    pub const GENERATE_AUDIO: bool = true;
    pub const TEMPERATURE: f64 = 0.7;
    pub const UPSCALE_FACTOR: &str = "x2";
    pub const CONCATENATOR_SEPARATOR: &str = " ";
    /// Separator used when several context texts feed one text generation
    pub const CONTEXT_SEPARATOR: &str = "\n\n";
}

/// Upper and lower bounds enforced on settings
pub mod limits {
    pub const MAX_PROMPT_CHARS: usize = 10_000;
    pub const MAX_CONTEXT_CHARS: usize = 50_000;
    pub const MIN_VIDEO_DURATION_SECONDS: u32 = 1;
    pub const MAX_VIDEO_DURATION_SECONDS: u32 = 30;
    pub const MIN_TEMPERATURE: f64 = 0.0;
    pub const MAX_TEMPERATURE: f64 = 2.0;
    /// Reference images forwarded to an image generation handler
    pub const MAX_IMAGE_REFERENCES: usize = 10;
    /// Reference images forwarded to a video generation handler
    pub const MAX_VIDEO_REFERENCES: usize = 3;
    pub const UPSCALE_FACTORS: [&str; 3] = ["x2", "x3", "x4"];
}
