//! Multi-stage build recipe for the release binary and runtime image.
//!
//! `builder` compiles a static musl binary and packs it with upx.
//! `runtime` is an empty filesystem holding only the binary, the system
//! user database and CA certificates, running as uid 1001.

use serde::{Deserialize, Serialize};
use shipwright_core::ReleaseConfig;

/// Stage of the rendered Dockerfile to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildTarget {
    /// Toolchain image holding the compiled binary.
    Builder,
    /// Minimal image that only runs the binary.
    Runtime,
}

impl BuildTarget {
    pub fn stage_name(&self) -> &'static str {
        match self {
            BuildTarget::Builder => "builder",
            BuildTarget::Runtime => "runtime",
        }
    }
}

/// Absolute path of the binary inside either stage.
pub fn binary_path(config: &ReleaseConfig) -> String {
    format!("/{}", config.product)
}

/// Render the Dockerfile for `config`.
pub fn render(config: &ReleaseConfig) -> String {
    let product = &config.product;
    let target = &config.target;
    let built = format!("target/{target}/release/{product}");

    format!(
        r#"# syntax=docker/dockerfile:1
FROM {builder_image} AS builder
RUN apk update && apk add musl-dev openssl-dev openssl-libs-static upx
WORKDIR /workdir
COPY . .
ENV OPENSSL_STATIC=1
RUN cargo build --target {target} --release \
 && upx --best --lzma {built} \
 && cp {built} /{product}

FROM {base_image} AS base
RUN apk add --no-cache ca-certificates \
 && update-ca-certificates \
 && adduser --disabled-password --gecos '' --home / --shell /sbin/nologin --no-create-home --uid 1001 rust

FROM scratch AS runtime
COPY --from=base /etc/passwd /etc/passwd
COPY --from=base /etc/group /etc/group
COPY --from=base /etc/ssl/certs /etc/ssl/certs
COPY --from=builder /{product} /{product}
USER 1001
ENTRYPOINT ["/{product}"]
"#,
        builder_image = config.builder_image,
        base_image = config.base_image,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReleaseConfig {
        ReleaseConfig::new("kerwood", "confluence-updater").with_product("confluence-updater")
    }

    #[test]
    fn test_render_builds_release_for_target() {
        let dockerfile = render(&config());
        assert!(dockerfile.contains("FROM rust:1.88-alpine AS builder"));
        assert!(dockerfile
            .contains("cargo build --target x86_64-unknown-linux-musl --release"));
        assert!(dockerfile.contains(
            "upx --best --lzma target/x86_64-unknown-linux-musl/release/confluence-updater"
        ));
    }

    #[test]
    fn test_render_runtime_stage() {
        let dockerfile = render(&config());
        assert!(dockerfile.contains("FROM scratch AS runtime"));
        assert!(dockerfile.contains("COPY --from=builder /confluence-updater /confluence-updater"));
        assert!(dockerfile.contains("USER 1001"));
        assert!(dockerfile.contains(r#"ENTRYPOINT ["/confluence-updater"]"#));
    }

    #[test]
    fn test_stage_names_match_rendered_stages() {
        let dockerfile = render(&config());
        for target in [BuildTarget::Builder, BuildTarget::Runtime] {
            assert!(dockerfile.contains(&format!("AS {}", target.stage_name())));
        }
    }

    #[test]
    fn test_binary_path() {
        assert_eq!(binary_path(&config()), "/confluence-updater");
    }
}
