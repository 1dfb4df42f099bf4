// Infrastructure layer modules
pub mod config;
pub mod csv_encoder;
pub mod dealer_database;
pub mod dealer_directory;
pub mod email;
pub mod index_database;
pub mod logging;
pub mod report_store;
pub mod unotifi_api;
pub mod webhook;

// Re-exports
pub use config::{
    ConfigError, ConfigRequirements, DirectoryApiSettings, EmailSettings, IndexDbSettings,
    ReportConfig,
};
pub use csv_encoder::{encode_csv, EncodeError, CSV_CONTENT_TYPE, CSV_EXTENSION};
pub use dealer_database::{
    in_placeholders, with_dealer_source, DealerConnector, MySqlDealerConnector, QueryError,
    QueryParam, QueryRowSource, ReportQuery,
};
pub use dealer_directory::{DealerDirectory, DirectoryError};
pub use email::{EmailMessage, EmailNotifier, SendGridEmailNotifier};
pub use index_database::IndexDbDealerDirectory;
pub use logging::init_logging;
pub use report_store::{ReportStore, S3ReportStore, StorageError, MAX_LINK_EXPIRY};
pub use unotifi_api::UnotifiApiDirectory;
pub use webhook::{CompletionNotice, HttpWebhookNotifier, NotifyError, WebhookNotifier};
