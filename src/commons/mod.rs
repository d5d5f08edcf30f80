//! Common types used by the various crypto manager components.
pub mod error;

//------------ Response Aliases ----------------------------------------------

pub type KmipEmptyResult = std::result::Result<(), self::error::Error>;
pub type KmipResult<T> = std::result::Result<T, self::error::Error>;
