pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Bad request: {message}")]
	BadRequest { message: String },
	#[error("Invalid cursor: {message}")]
	InvalidCursor { message: String },
	#[error("Forbidden: {message}")]
	Forbidden { message: String },
	#[error("Service unavailable: {message}")]
	Unavailable { message: String },
	#[error("Cursor cache error: {message}")]
	CursorCache { message: String },
	#[error("Search backend error: {message}")]
	Backend { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl Error {
	/// Status code an HTTP layer should answer with.
	pub fn http_status(&self) -> u16 {
		match self {
			Self::BadRequest { .. } => 400,
			Self::InvalidCursor { .. } => 404,
			Self::Forbidden { .. } => 403,
			Self::Unavailable { .. } => 503,
			Self::CursorCache { .. } | Self::Internal { .. } => 500,
			Self::Backend { .. } => 502,
		}
	}
}
impl From<sieve_domain::Error> for Error {
	fn from(err: sieve_domain::Error) -> Self {
		match err {
			sieve_domain::Error::BadRequest { message } => Self::BadRequest { message },
			sieve_domain::Error::InvalidPattern { message } => Self::Internal { message },
		}
	}
}
