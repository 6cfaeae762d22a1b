//! Test bodies, one module per area of the tree library.

pub mod document;
pub mod file;
pub mod parse;

/// Document used by tests that need realistic content.
pub(crate) const SAMPLE: &str = "\
(config \"v1\" (server (port \"8080\") (host \"localhost\")) (debug))
(users (user \"alice\" (role \"admin\")) (user \"bob\"))
";
