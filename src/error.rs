use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlindsError>;

#[derive(Error, Debug)]
pub enum BlindsError {
    #[error("configuration error")]
    Config(#[from] config::ConfigError),
    #[error("controller base url is not configured")]
    MissingBaseUrl,
    #[error("http request failed")]
    Http(#[from] reqwest::Error),
    #[error("controller rejected credentials (401 Unauthorized)")]
    Unauthorized,
    #[error("received HTML/login page instead of XML, check credentials")]
    LoginPage,
    #[error("failed to parse controller xml")]
    Xml(#[from] quick_xml::Error),
    #[error("controller response is not an xml document: {0}")]
    MalformedXml(&'static str),
    #[error("malformed xml attribute")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("invalid device id {0:?}, expected 'adr,ept'")]
    InvalidDeviceId(String),
    #[error("invalid hex value {0:?}")]
    InvalidHex(String),
    #[error("unknown command {0:?}, use open, close or stop")]
    UnknownCommand(String),
    #[error("unknown target {0:?}")]
    UnknownTarget(String),
    #[error("group {0:?} has no members on the controller")]
    EmptyGroup(String),
    #[error("group {num} rejected command with result {result}")]
    GroupCommandRejected { num: String, result: String },
    #[error("{0} does not support position control")]
    PositionUnsupported(String),
}
