use crate::capture::ProvenanceCapture;
use crate::capture::graph::{
    CONTEXT_LOCAL, CopyAction, Definition, ExecOp, FileAction, FileActionKind, Input, LOCAL_SCHEME,
    Location, Meta, Mount, NetMode, Op, Range, SourceDocument,
};
use crate::capture::materials::ImageSource;
use crate::error::Result;
use crate::hash::{DigestAlgorithm, digest_string};
use crate::oci::Platform;

/// A Dockerfile compiled into a graph, with the line each op came from.
pub struct DockerfileFixture {
    pub dockerfile: String,
    pub definition: Definition,
    /// (op digest, 1-based line)
    pub locations: Vec<(String, u32)>,
    /// Image references named by FROM, in order.
    pub images: Vec<String>,
    pub uses_context: bool,
}

/// Stable fake digest for an image reference.
pub fn image_digest(reference: &str) -> String {
    digest_string(reference.as_bytes(), DigestAlgorithm::Sha256)
}

fn image_identifier(reference: &str) -> String {
    let name = if reference.contains('/') {
        reference.to_string()
    } else {
        format!("docker.io/library/{reference}")
    };
    format!("docker-image://{name}")
}

/// Compiles the small Dockerfile subset used by the tests: `FROM`, `RUN`
/// (with `--network=none` and secret / ssh mounts) and `COPY` from the
/// build context.
pub fn compile_dockerfile(dockerfile: &str) -> Result<DockerfileFixture> {
    let mut definition = Definition::new();
    let mut locations = Vec::new();
    let mut images = Vec::new();
    let mut uses_context = false;
    let mut current: Option<String> = None;

    for (index, raw) in dockerfile.lines().enumerate() {
        let line = (index + 1) as u32;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let (instruction, rest) = text.split_once(' ').unwrap_or((text, ""));

        let digest = match instruction.to_uppercase().as_str() {
            "FROM" => {
                let reference = rest.trim().to_string();
                let digest = definition.push(Op::source(image_identifier(&reference)))?;
                images.push(reference);
                digest
            }
            "RUN" => {
                let mut exec = ExecOp::default();
                let mut words = Vec::new();
                for word in rest.split_whitespace() {
                    match word.strip_prefix("--") {
                        Some("network=none") => exec.network = NetMode::None,
                        Some(flag) if flag.starts_with("mount=") => {
                            exec.mounts.push(parse_mount(&flag["mount=".len()..]));
                        }
                        _ => words.push(word),
                    }
                }
                exec.meta = Meta {
                    args: vec!["/bin/sh".into(), "-c".into(), words.join(" ")],
                    ..Meta::default()
                };
                let base = current.clone().unwrap_or_default();
                exec.mounts.insert(0, Mount::bind(0, "/"));
                definition.push(Op::exec(vec![Input::new(base, 0)], exec))?
            }
            "COPY" => {
                uses_context = true;
                let context = definition.push(Op::source(format!("{LOCAL_SCHEME}{CONTEXT_LOCAL}")))?;
                let (src, dest) = rest.trim().split_once(' ').unwrap_or((rest, "/"));
                let base = current.clone().unwrap_or_default();
                let action = FileAction {
                    input: 0,
                    secondary_input: 1,
                    output: 0,
                    action: FileActionKind::Copy(CopyAction {
                        src: src.to_string(),
                        dest: dest.to_string(),
                    }),
                };
                definition.push(Op::file(
                    vec![Input::new(base, 0), Input::new(context, 0)],
                    vec![action],
                ))?
            }
            other => panic!("unsupported instruction {other}"),
        };
        locations.push((digest.clone(), line));
        current = Some(digest);
    }

    if let Some(last) = current {
        definition.push(Op::terminal(Input::new(last, 0)))?;
    }

    Ok(DockerfileFixture {
        dockerfile: dockerfile.to_string(),
        definition,
        locations,
        images,
        uses_context,
    })
}

fn parse_mount(spec: &str) -> Mount {
    let mut kind = "";
    let mut id = "";
    let mut required = false;
    for part in spec.split(',') {
        match part.split_once('=') {
            Some(("type", v)) => kind = v,
            Some(("id", v)) => id = v,
            Some(("required", v)) => required = v == "true",
            _ => {}
        }
    }
    match kind {
        "ssh" => Mount::ssh(id, !required),
        _ => Mount::secret(id, &format!("/run/secrets/{id}"), !required),
    }
}

/// Feeds a compiled Dockerfile into `capture` the way the solver and the
/// frontend would.
pub fn capture_fixture(capture: &ProvenanceCapture, fixture: &DockerfileFixture) -> Result<()> {
    let platform = capture.platform().clone();
    for reference in &fixture.images {
        capture.add_image(&ImageSource {
            reference: reference.clone(),
            platform: Some(platform.clone()),
            digest: image_digest(reference),
        })?;
    }
    if fixture.uses_context {
        capture.add_local(CONTEXT_LOCAL)?;
    }

    capture.record_definition(&fixture.definition)?;
    capture.add_source_document(SourceDocument {
        filename: "Dockerfile".to_string(),
        language: "Dockerfile".to_string(),
        data: fixture.dockerfile.clone().into_bytes(),
        definition: Some(fixture.definition.clone()),
    })?;
    for (digest, line) in &fixture.locations {
        capture.add_location(
            digest,
            Location {
                filename: "Dockerfile".to_string(),
                ranges: vec![Range::line(*line)],
            },
        )?;
    }
    Ok(())
}

pub fn linux_amd64() -> Platform {
    Platform::new("linux", "amd64")
}
