//! Error taxonomy for the flock engine, pools and reconciler.
//!
//! Every public operation returns `Result<T, FlockError>`. `FlockError`
//! renders to `{"error": "<code>", ...fields}` via `Serialize`, matching the
//! string-code contract external collaborators expect; `Display`/`Error`
//! (via thiserror) carry a human message for logging.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlockError {
    #[error("flock not found: {0}")]
    InvalidFlock(String),

    #[error("no record for reqid {0}")]
    InvalidReqid(String),

    #[error("override image {image_passed} does not satisfy label {label_expected}")]
    InvalidImageParam {
        image_passed: String,
        label_expected: String,
    },

    #[error("invalid request options: {0}")]
    InvalidOptions(String),

    #[error("container {container} is not deferred or already started")]
    InvalidDeferred { container: String },

    #[error("flock is not running")]
    FlockNotRunning,

    #[error("failed to materialise flock: {0}")]
    StartError(String),

    #[error("request is not running")]
    NotRunning,

    #[error("operation already completed")]
    AlreadyDone,

    #[error("no such pool: {0}")]
    NoSuchPool(String),

    #[error("coordination store error: {0}")]
    Store(String),

    #[error("container runtime error: {0}")]
    Runtime(String),
}

impl FlockError {
    /// The stable string code used on the wire, per the error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            FlockError::InvalidFlock(_) => "invalid_flock",
            FlockError::InvalidReqid(_) => "invalid_reqid",
            FlockError::InvalidImageParam { .. } => "invalid_image_param",
            FlockError::InvalidOptions(_) => "invalid_options",
            FlockError::InvalidDeferred { .. } => "invalid_deferred",
            FlockError::FlockNotRunning => "flock_not_running",
            FlockError::StartError(_) => "start_error",
            FlockError::NotRunning => "not_running",
            FlockError::AlreadyDone => "already_done",
            FlockError::NoSuchPool(_) => "no_such_pool",
            FlockError::Store(_) => "store_error",
            FlockError::Runtime(_) => "runtime_error",
        }
    }
}

impl Serialize for FlockError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("error", self.code())?;
        match self {
            FlockError::InvalidImageParam {
                image_passed,
                label_expected,
            } => {
                map.serialize_entry("image_passed", image_passed)?;
                map.serialize_entry("label_expected", label_expected)?;
            }
            FlockError::InvalidDeferred { container } => {
                map.serialize_entry("container", container)?;
            }
            FlockError::InvalidFlock(flock) => {
                map.serialize_entry("flock", flock)?;
            }
            FlockError::InvalidReqid(reqid) => {
                map.serialize_entry("reqid", reqid)?;
            }
            FlockError::StartError(details) => {
                map.serialize_entry("details", details)?;
            }
            _ => {}
        }
        map.end()
    }
}

pub type FlockResult<T> = Result<T, FlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_image_param_serializes_required_fields() {
        let err = FlockError::InvalidImageParam {
            image_passed: "unlabeled/image".into(),
            label_expected: "test.isbox=box".into(),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "invalid_image_param");
        assert_eq!(value["image_passed"], "unlabeled/image");
        assert_eq!(value["label_expected"], "test.isbox=box");
    }

    #[test]
    fn codes_match_taxonomy() {
        assert_eq!(FlockError::NoSuchPool("p".into()).code(), "no_such_pool");
        assert_eq!(FlockError::AlreadyDone.code(), "already_done");
    }
}
