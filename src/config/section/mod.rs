//! Configuration section definitions.
//!
//! Each module corresponds to a section in `repack.toml`:
//!
//! | Module    | TOML Section        | Purpose                                  |
//! |-----------|---------------------|------------------------------------------|
//! | `build`   | `[build]`           | Platforms, bundler command, watch        |
//! | `server`  | `[server]`          | HTTP / HMR ports, TLS                    |
//! | `targets` | `[targets.<name>]`  | Per-platform command and env overrides   |

mod build;
mod server;
mod targets;

pub use build::{BuildMode, BuildSectionConfig};
pub use server::ServerConfig;
pub use targets::TargetSection;
