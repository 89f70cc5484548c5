use spc_model::ValidationErrors;

#[derive(Debug)]
pub enum ClientError {
    /// Field-level rejections, from local checks or from the server.
    Validation(ValidationErrors),
    NotFound,
    Unauthorized(String),
    Forbidden(String),
    Transport(String),
    Unexpected { status: u16, body: String },
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Validation(errors) => write!(f, "Validation failed: {}", errors),
            ClientError::NotFound => write!(f, "Not found"),
            ClientError::Unauthorized(detail) => write!(f, "Unauthorized: {}", detail),
            ClientError::Forbidden(detail) => write!(f, "Forbidden: {}", detail),
            ClientError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ClientError::Unexpected { status, body } => {
                write!(f, "Unexpected response ({}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ValidationErrors> for ClientError {
    fn from(errors: ValidationErrors) -> Self {
        ClientError::Validation(errors)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
