mod config;
mod error;
mod metadata;
mod mime;
mod poll;

pub use config::{
    load_file_config, AppConfig, ChunkingConfig, FileConfig, DEFAULT_BASE_URL, DEFAULT_BIND_ADDR,
    DEFAULT_CONFIG, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
pub use error::{Result, StorekeepError};
pub use metadata::{FileRecord, MetadataStore, NewStore, StoreRecord};
pub use mime::{resolve_mime_type, GENERIC_MIME};
pub use poll::{poll_until, PollPolicy, PollStatus};
pub use tokio_util::sync::CancellationToken;
