pub mod bsp;
pub mod error;
pub mod manager;
pub mod transport;
pub mod types;

pub use error::TransportError;
pub use manager::TransportRegistry;
pub use transport::MessagingTransport;
pub use types::{DownloadedMedia, SendResult, TemplateButton, TransportStatus};
