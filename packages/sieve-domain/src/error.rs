pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
	#[error("Bad request: {message}")]
	BadRequest { message: String },
	#[error("Invalid pattern: {message}")]
	InvalidPattern { message: String },
}
impl From<regex::Error> for Error {
	fn from(err: regex::Error) -> Self {
		Self::InvalidPattern { message: err.to_string() }
	}
}
impl Error {
	pub fn bad_request(message: impl Into<String>) -> Self {
		Self::BadRequest { message: message.into() }
	}
}
