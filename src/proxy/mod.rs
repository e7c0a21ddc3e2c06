pub mod nginx;

pub use nginx::{fingerprint, render};
