use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("no token configured; pass --token or set `token` in the config file")]
    MissingToken,

    #[error("timed out waiting for the feed")]
    Timeout,

    #[error("{msg}")]
    CustomError { msg: String },
}

impl CliError {
    pub fn custom_error(msg: String) -> Self {
        Self::CustomError { msg }
    }
}
