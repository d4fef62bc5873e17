//! Embeds build and git metadata for `/api/version`.
//!
//! Builds without a `.git` directory (source tarballs, container images) can
//! pass `VERGEN_GIT_SHA` / `VERGEN_GIT_COMMIT_TIMESTAMP` in the environment
//! instead.

use std::error::Error;
use vergen_gix::{Build, Emitter, Gix};

fn main() -> Result<(), Box<dyn Error>> {
    let has_env_metadata = std::env::var("VERGEN_GIT_SHA").is_ok()
        || std::env::var("VERGEN_GIT_COMMIT_TIMESTAMP").is_ok();

    if has_env_metadata {
        println!("cargo:warning=Using git metadata from environment variables");
        return Ok(());
    }

    let build = Build::all_build();
    let gix = Gix::all_git();
    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&gix)?
        .emit()?;
    Ok(())
}
