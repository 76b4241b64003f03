mod cursor;
mod decoder;

pub use cursor::ByteCursor;
pub use decoder::{PartialSmf, Smf, SmfDecoder};

#[cfg(test)]
pub(crate) use decoder::tests::file as test_file;
