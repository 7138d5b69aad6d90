//! Account lifecycle endpoints: registration with a verification code and
//! password reset by email link.

pub(crate) mod password;
pub(crate) mod register;
pub(crate) mod types;

#[cfg(test)]
mod tests;
