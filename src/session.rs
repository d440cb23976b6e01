//! Per-build arena of platform captures.
//!
//! A [`BuildSession`] owns one [`ProvenanceCapture`] per requested platform.
//! Captures are handed out as `Arc`s to whatever executes that platform's
//! part of the build; [`BuildSession::finish`] reclaims them, so a capture
//! can only be finalized once every worker has let go of it. Dropping the
//! session without finishing discards all captures and emits nothing.

use crate::capture::{InvocationContext, ProvenanceCapture};
use crate::error::{Error, Result};
use crate::oci::Platform;
use crate::slsa::{Predicate, ProvenanceOptions, build_predicate};
use std::sync::Arc;

const PLATFORM_KEY: &str = "platform";

/// Predicate generated for one platform of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformProvenance {
    pub platform: Platform,
    pub predicate: Predicate,
}

#[derive(Debug)]
pub struct BuildSession {
    context: InvocationContext,
    options: ProvenanceOptions,
    captures: Vec<Arc<ProvenanceCapture>>,
}

impl BuildSession {
    /// Creates a session with one capture per distinct platform, in first
    /// requested order. No platforms means the builder's own platform.
    pub fn new(context: InvocationContext, options: ProvenanceOptions, platforms: &[Platform]) -> Result<Self> {
        let mut unique: Vec<Platform> = Vec::new();
        for platform in platforms {
            if unique.contains(platform) {
                log::debug!("platform {platform} requested more than once");
                continue;
            }
            unique.push(platform.clone());
        }
        if unique.is_empty() {
            unique.push(Platform::parse(&context.builder_platform)?);
        }

        log::info!(
            "capturing {} provenance for {} platform(s), invocation {}",
            options.version,
            unique.len(),
            context.id
        );

        Ok(Self {
            context,
            options,
            captures: unique
                .into_iter()
                .map(|p| Arc::new(ProvenanceCapture::new(p)))
                .collect(),
        })
    }

    /// Creates a session from the request's build attributes. Returns
    /// `None` when the request did not ask for provenance.
    pub fn from_request(context: InvocationContext) -> Result<Option<Self>> {
        let Some(attrs) = context.attrs() else {
            return Ok(None);
        };
        let Some(options) = ProvenanceOptions::from_attrs(attrs)? else {
            return Ok(None);
        };
        let platforms = match attrs.get(PLATFORM_KEY) {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(Platform::parse)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Self::new(context, options, &platforms).map(Some)
    }

    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    pub fn options(&self) -> &ProvenanceOptions {
        &self.options
    }

    pub fn platforms(&self) -> Vec<&Platform> {
        self.captures.iter().map(|c| c.platform()).collect()
    }

    /// Shared handle to the capture for `platform`.
    pub fn capture(&self, platform: &Platform) -> Option<Arc<ProvenanceCapture>> {
        self.captures
            .iter()
            .find(|c| c.platform() == platform)
            .cloned()
    }

    /// Finalizes every capture and builds one predicate per platform.
    ///
    /// Fails if any capture handle is still held elsewhere.
    pub fn finish(self) -> Result<Vec<PlatformProvenance>> {
        let mut out = Vec::with_capacity(self.captures.len());
        for capture in self.captures {
            let capture = Arc::try_unwrap(capture).map_err(|c| {
                Error::Capture(format!(
                    "capture for {} is still in use, the build has not completed",
                    c.platform()
                ))
            })?;
            let snapshot = capture.finalize(&self.context)?;
            let predicate = build_predicate(&snapshot, &self.options);
            out.push(PlatformProvenance {
                platform: snapshot.platform,
                predicate,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::args::{FRONTEND_DOCKERFILE, FrontendRequest};
    use crate::capture::graph::{Definition, Input, Op};

    fn context(attrs: &[(&str, &str)]) -> InvocationContext {
        let mut request = FrontendRequest::new(FRONTEND_DOCKERFILE);
        for (k, v) in attrs {
            request = request.with_attr(k, v);
        }
        InvocationContext::new(Some(request))
    }

    fn trivial_definition() -> Definition {
        let mut def = Definition::new();
        let src = def.push(Op::source("docker-image://docker.io/library/busybox:latest")).unwrap();
        def.push(Op::terminal(Input::new(src, 0))).unwrap();
        def
    }

    #[test]
    fn test_duplicate_platforms_collapse() {
        let session = BuildSession::from_request(context(&[
            ("attest:provenance", "mode=max"),
            ("platform", "linux/amd64,linux/arm64,linux/x86_64"),
        ]))
        .unwrap()
        .unwrap();
        let platforms: Vec<String> = session.platforms().iter().map(|p| p.to_string()).collect();
        assert_eq!(platforms, vec!["linux/amd64", "linux/arm64"]);
    }

    #[test]
    fn test_no_provenance_requested() {
        assert!(BuildSession::from_request(context(&[])).unwrap().is_none());
        assert!(BuildSession::from_request(InvocationContext::new(None)).unwrap().is_none());
    }

    #[test]
    fn test_finish_fails_while_capture_held() {
        let session = BuildSession::new(context(&[]), ProvenanceOptions::default(), &[]).unwrap();
        let platform = session.platforms()[0].clone();
        let capture = session.capture(&platform).unwrap();
        capture.record_definition(&trivial_definition()).unwrap();
        assert!(matches!(session.finish(), Err(Error::Capture(_))));
        drop(capture);
    }

    #[test]
    fn test_one_predicate_per_platform() {
        let platforms = [
            Platform::parse("linux/amd64").unwrap(),
            Platform::parse("linux/arm64").unwrap(),
            Platform::parse("linux/amd64").unwrap(),
        ];
        let session = BuildSession::new(context(&[]), ProvenanceOptions::default(), &platforms).unwrap();
        std::thread::scope(|s| {
            for platform in session.platforms() {
                let capture = session.capture(platform).unwrap();
                s.spawn(move || capture.record_definition(&trivial_definition()).unwrap());
            }
        });
        let results = session.finish().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].platform.to_string(), "linux/amd64");
        assert_eq!(results[1].platform.to_string(), "linux/arm64");
    }
}
