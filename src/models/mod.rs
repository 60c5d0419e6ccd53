pub mod camera;
pub mod capture;
pub mod detection;
pub mod schedule;

pub use camera::CameraLink;
pub use capture::{CaptureKind, CapturedImage, ImageLayout, NamingScheme};
pub use detection::{
    DetectionRequest, DetectionResult, HighlightColor, HighlightShape, OutputFormat,
    RenderOptions, SectorHighlight,
};
pub use schedule::{dedup_sectors, parse_time_of_day, DaySet, EntryId, EntryKey, ScheduleEntry};
