pub mod analyzer;
pub mod signal_source;
pub mod telegram;
pub mod transport;

// Re-export commonly used types
pub use analyzer::HttpSignalSource;
pub use signal_source::SignalSource;
pub use telegram::TelegramClient;
pub use transport::DeliveryTransport;
