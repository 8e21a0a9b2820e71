pub mod executor;
pub mod registry;
pub mod scrape;
pub mod search;

pub use executor::{ToolCall, ToolCallRecord, ToolCallStatus, ToolExecutor};
pub use registry::{Tool, ToolRegistry};
pub use scrape::ScrapeTool;
pub use search::{SearchResult, SearchTool};
