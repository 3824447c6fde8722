//! # Script Boundary Gateway
//!
//! The entry surface sandboxed automation scripts call into. Every operation
//! takes virtual-path arguments, rewrites relative ones against the invoking
//! script's own location, and runs the permission gate before anything else:
//! all sources are read-checked in order, then the destination is
//! write-checked, and the first failing check aborts the whole call.
//!
//! Failures travel on two distinct channels. An ACL failure is fatal: it is
//! returned as the `Err` arm ([`PermissionViolation`]) and aborts the
//! enclosing script. Every other failure (not-found, unsupported format,
//! malformed arguments, I/O) is recoverable: it is handed to the
//! [`ErrorReporter`] and the call returns its falsy value (`false` or
//! `None`). Callers check the return value for the latter and catch only
//! the former.

use std::sync::Arc;

use tracing::warn;

use crate::detect::{self, ArchiveFormat};
use crate::error::{OpError, PermissionViolation};
use crate::ops::{self, Executor};
use crate::owner;
use crate::user::Principal;
use crate::vfs::{ResolvedLocation, Vfs, VirtualPath};
use crate::zipview;

/// Permission bits applied to files materialized in the transient namespace.
const TRANSIENT_FILE_MODE: u32 = 0o755;

/// The namespace single extracted entries are parked under.
const TRANSIENT_NAMESPACE: &str = "tmp";

/// A script-boundary argument that may arrive as one path or a list of
/// paths. Resolved exactly once into a uniform ordered sequence.
#[derive(Debug, Clone)]
pub enum SourceArg {
    Single(String),
    Many(Vec<String>),
}

impl SourceArg {
    pub fn into_paths(self) -> Vec<String> {
        match self {
            SourceArg::Single(p) => vec![p],
            SourceArg::Many(ps) => ps,
        }
    }
}

impl From<&str> for SourceArg {
    fn from(p: &str) -> Self {
        SourceArg::Single(p.to_string())
    }
}

impl From<String> for SourceArg {
    fn from(p: String) -> Self {
        SourceArg::Single(p)
    }
}

impl From<Vec<String>> for SourceArg {
    fn from(ps: Vec<String>) -> Self {
        SourceArg::Many(ps)
    }
}

impl From<Vec<&str>> for SourceArg {
    fn from(ps: Vec<&str>) -> Self {
        SourceArg::Many(ps.into_iter().map(str::to_string).collect())
    }
}

/// The out-of-band half of the recoverable failure channel.
///
/// The scripting engine surfaces these notifications to the script runtime;
/// the paired in-band signal is the falsy return value.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &OpError);
}

/// Default reporter: recoverable failures land in the log stream.
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, err: &OpError) {
        warn!(%err, "archive operation failed");
    }
}

/// The invoking context of one script call: the acting principal and the
/// script's own virtual location, used to rewrite relative arguments.
pub struct ScriptContext {
    principal: Arc<Principal>,
    script_base: VirtualPath,
}

impl ScriptContext {
    pub fn new(principal: Arc<Principal>, script_base: VirtualPath) -> Self {
        Self { principal, script_base }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    fn rewrite(&self, raw: &str) -> VirtualPath {
        VirtualPath::resolve_against(raw, &self.script_base)
    }
}

/// The archive operations surface registered with the scripting engine.
pub struct ArchiveGateway {
    vfs: Arc<Vfs>,
    reporter: Arc<dyn ErrorReporter>,
}

impl ArchiveGateway {
    pub fn new(vfs: Arc<Vfs>) -> Self {
        Self::with_reporter(vfs, Arc::new(LogReporter))
    }

    pub fn with_reporter(vfs: Arc<Vfs>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { vfs, reporter }
    }

    // ---- gate helpers -----------------------------------------------------

    fn require_read(
        &self,
        ctx: &ScriptContext,
        vpath: &VirtualPath,
    ) -> Result<(), PermissionViolation> {
        if ctx.principal().can_read(vpath) {
            Ok(())
        } else {
            Err(PermissionViolation::read(vpath.as_str()))
        }
    }

    fn require_write(
        &self,
        ctx: &ScriptContext,
        vpath: &VirtualPath,
    ) -> Result<(), PermissionViolation> {
        if ctx.principal().can_write(vpath) {
            Ok(())
        } else {
            Err(PermissionViolation::write(vpath.as_str()))
        }
    }

    fn rewrite_arg(&self, ctx: &ScriptContext, raw: &str, what: &str) -> Result<VirtualPath, OpError> {
        if raw.is_empty() {
            return Err(OpError::InvalidArgument(format!("{what} path is empty")));
        }
        Ok(ctx.rewrite(raw))
    }

    /// Runs the recoverable tail of an operation, reporting any failure and
    /// collapsing it to `false`.
    fn run_bool(&self, work: impl FnOnce() -> Result<(), OpError>) -> bool {
        match work() {
            Ok(()) => true,
            Err(err) => {
                self.reporter.report(&err);
                false
            }
        }
    }

    /// As [`Self::run_bool`], for operations that yield a value.
    fn run_value<T>(&self, work: impl FnOnce() -> Result<T, OpError>) -> Option<T> {
        match work() {
            Ok(v) => Some(v),
            Err(err) => {
                self.reporter.report(&err);
                None
            }
        }
    }

    // ---- extraction -------------------------------------------------------

    /// Extracts a zip archive into a destination directory.
    pub fn extract_zip(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.extract_with(ctx, src, dest, ArchiveFormat::Zip)
    }

    /// Extracts a tar archive into a destination directory.
    pub fn extract_tar(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.extract_with(ctx, src, dest, ArchiveFormat::Tar)
    }

    /// Extracts a tar.gz archive into a destination directory.
    pub fn extract_tar_gz(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.extract_with(ctx, src, dest, ArchiveFormat::TarGz)
    }

    /// Detects the source's format with the codec probe and extracts it.
    /// A source no codec can open fails with an unsupported-format report,
    /// as does a compressor-only format such as gzip.
    pub fn extract_any(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        let (src_vpath, dest_vpath) = match self.rewrite_pair(ctx, src, dest) {
            Ok(pair) => pair,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };
        self.require_read(ctx, &src_vpath)?;
        self.require_write(ctx, &dest_vpath)?;

        Ok(self.run_bool(|| {
            let username = ctx.principal().username();
            let src_loc = self.vfs.resolve(&src_vpath, username)?;
            let dest_loc = self.vfs.resolve(&dest_vpath, username)?;
            let format = detect::probe_codec(&src_loc.rpath)?;
            if !crate::codec::capabilities(format).unarchive {
                return Err(OpError::UnsupportedFormat(format!(
                    "{} does not support extraction",
                    format.as_str()
                )));
            }
            Executor::new(&self.vfs, ctx.principal()).extract(format, &src_loc, &dest_loc)
        }))
    }

    fn extract_with(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
        format: ArchiveFormat,
    ) -> Result<bool, PermissionViolation> {
        let (src_vpath, dest_vpath) = match self.rewrite_pair(ctx, src, dest) {
            Ok(pair) => pair,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };
        self.require_read(ctx, &src_vpath)?;
        self.require_write(ctx, &dest_vpath)?;

        Ok(self.run_bool(|| {
            let username = ctx.principal().username();
            let src_loc = self.vfs.resolve(&src_vpath, username)?;
            let dest_loc = self.vfs.resolve(&dest_vpath, username)?;
            Executor::new(&self.vfs, ctx.principal()).extract(format, &src_loc, &dest_loc)
        }))
    }

    fn rewrite_pair(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<(VirtualPath, VirtualPath), OpError> {
        let src_vpath = self.rewrite_arg(ctx, src, "source")?;
        let dest_vpath = self.rewrite_arg(ctx, dest, "destination")?;
        Ok((src_vpath, dest_vpath))
    }

    // ---- creation ---------------------------------------------------------

    /// Packs one or many sources into a zip archive.
    pub fn create_zip(
        &self,
        ctx: &ScriptContext,
        sources: SourceArg,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.create_with(ctx, sources, dest, ArchiveFormat::Zip)
    }

    /// Packs one or many sources into a tar archive.
    pub fn create_tar(
        &self,
        ctx: &ScriptContext,
        sources: SourceArg,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.create_with(ctx, sources, dest, ArchiveFormat::Tar)
    }

    /// Packs one or many sources into a tar.gz archive.
    pub fn create_tar_gz(
        &self,
        ctx: &ScriptContext,
        sources: SourceArg,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.create_with(ctx, sources, dest, ArchiveFormat::TarGz)
    }

    /// Packs sources into an archive of the named format (`zip`, `tar`,
    /// `tar.gz`/`tgz`/`targz`). Requesting `gz`/`gzip` here is rejected:
    /// gzip has no container concept, so single-file compression is its own
    /// operation ([`Self::compress_gzip`]).
    pub fn create_archive(
        &self,
        ctx: &ScriptContext,
        sources: SourceArg,
        dest: &str,
        format: &str,
    ) -> Result<bool, PermissionViolation> {
        let gated = match self.gate_create(ctx, sources, dest) {
            Ok(gated) => gated,
            Err(GateOutcome::Fatal(v)) => return Err(v),
            Err(GateOutcome::Recoverable(err)) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };

        Ok(self.run_bool(|| {
            let format = ops::parse_create_format(format)?;
            let (source_locs, dest_loc, dest_vpath) = self.resolve_create(ctx, gated)?;
            Executor::new(&self.vfs, ctx.principal()).create(
                format,
                &source_locs,
                &dest_loc,
                &dest_vpath,
            )
        }))
    }

    fn create_with(
        &self,
        ctx: &ScriptContext,
        sources: SourceArg,
        dest: &str,
        format: ArchiveFormat,
    ) -> Result<bool, PermissionViolation> {
        let gated = match self.gate_create(ctx, sources, dest) {
            Ok(gated) => gated,
            Err(GateOutcome::Fatal(v)) => return Err(v),
            Err(GateOutcome::Recoverable(err)) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };

        Ok(self.run_bool(|| {
            let (source_locs, dest_loc, dest_vpath) = self.resolve_create(ctx, gated)?;
            Executor::new(&self.vfs, ctx.principal()).create(
                format,
                &source_locs,
                &dest_loc,
                &dest_vpath,
            )
        }))
    }

    /// Rewrites and permission-checks a create call: every source for read,
    /// in order, then the destination for write.
    fn gate_create(
        &self,
        ctx: &ScriptContext,
        sources: SourceArg,
        dest: &str,
    ) -> Result<GatedCreate, GateOutcome> {
        let raw_sources = sources.into_paths();
        if raw_sources.is_empty() {
            return Err(GateOutcome::Recoverable(OpError::InvalidArgument(
                "no source paths supplied".into(),
            )));
        }

        let mut source_vpaths = Vec::with_capacity(raw_sources.len());
        for raw in &raw_sources {
            source_vpaths.push(
                self.rewrite_arg(ctx, raw, "source")
                    .map_err(GateOutcome::Recoverable)?,
            );
        }
        let dest_vpath = self
            .rewrite_arg(ctx, dest, "destination")
            .map_err(GateOutcome::Recoverable)?;

        for vpath in &source_vpaths {
            self.require_read(ctx, vpath).map_err(GateOutcome::Fatal)?;
        }
        self.require_write(ctx, &dest_vpath)
            .map_err(GateOutcome::Fatal)?;

        Ok(GatedCreate { source_vpaths, dest_vpath })
    }

    fn resolve_create(
        &self,
        ctx: &ScriptContext,
        gated: GatedCreate,
    ) -> Result<(Vec<ResolvedLocation>, ResolvedLocation, VirtualPath), OpError> {
        let username = ctx.principal().username();
        let mut source_locs = Vec::with_capacity(gated.source_vpaths.len());
        for vpath in &gated.source_vpaths {
            source_locs.push(self.vfs.resolve(vpath, username)?);
        }
        let dest_loc = self.vfs.resolve(&gated.dest_vpath, username)?;
        Ok((source_locs, dest_loc, gated.dest_vpath))
    }

    // ---- single-stream gzip ----------------------------------------------

    /// Gzip-compresses one file into a `.gz` destination.
    pub fn compress_gzip(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.gzip_with(ctx, src, dest, true)
    }

    /// Decompresses one `.gz` file into its destination.
    pub fn decompress_gzip(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
    ) -> Result<bool, PermissionViolation> {
        self.gzip_with(ctx, src, dest, false)
    }

    fn gzip_with(
        &self,
        ctx: &ScriptContext,
        src: &str,
        dest: &str,
        compressing: bool,
    ) -> Result<bool, PermissionViolation> {
        let (src_vpath, dest_vpath) = match self.rewrite_pair(ctx, src, dest) {
            Ok(pair) => pair,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };
        self.require_read(ctx, &src_vpath)?;
        self.require_write(ctx, &dest_vpath)?;

        Ok(self.run_bool(|| {
            let username = ctx.principal().username();
            let src_loc = self.vfs.resolve(&src_vpath, username)?;
            let dest_loc = self.vfs.resolve(&dest_vpath, username)?;
            let executor = Executor::new(&self.vfs, ctx.principal());
            if compressing {
                executor.compress_gzip(&src_loc, &dest_loc, &dest_vpath)
            } else {
                executor.decompress_gzip(&src_loc, &dest_loc, &dest_vpath)
            }
        }))
    }

    // ---- inspection -------------------------------------------------------

    /// Whether any codec can open the path. Both probes missing yields
    /// `false` without an error report; only argument and resolution
    /// failures are reported.
    pub fn is_valid_archive(
        &self,
        ctx: &ScriptContext,
        path: &str,
    ) -> Result<bool, PermissionViolation> {
        let vpath = match self.rewrite_arg(ctx, path, "archive") {
            Ok(v) => v,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };
        self.require_read(ctx, &vpath)?;

        let resolved = match self.vfs.resolve(&vpath, ctx.principal().username()) {
            Ok(loc) => loc,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(false);
            }
        };
        Ok(detect::probe_codec(&resolved.rpath).is_ok())
    }

    /// Classifies the path's format by extension, falling back to magic
    /// bytes; undetectable content is reported as `unknown`, not an error.
    pub fn detect_format(
        &self,
        ctx: &ScriptContext,
        path: &str,
    ) -> Result<Option<ArchiveFormat>, PermissionViolation> {
        let vpath = match self.rewrite_arg(ctx, path, "archive") {
            Ok(v) => v,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(None);
            }
        };
        self.require_read(ctx, &vpath)?;

        Ok(self.run_value(|| {
            let resolved = self.vfs.resolve(&vpath, ctx.principal().username())?;
            Ok(detect::detect_format(&resolved.rpath))
        }))
    }

    /// Serializes the archive's full entry tree as JSON
    /// (`name`/`isDir`/`size`/`children`).
    pub fn list_contents(
        &self,
        ctx: &ScriptContext,
        path: &str,
    ) -> Result<Option<String>, PermissionViolation> {
        let vpath = match self.rewrite_arg(ctx, path, "archive") {
            Ok(v) => v,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(None);
            }
        };
        self.require_read(ctx, &vpath)?;

        Ok(self.run_value(|| {
            let resolved = self.vfs.resolve(&vpath, ctx.principal().username())?;
            let tree = zipview::build_tree(&resolved.rpath)?;
            Ok(serde_json::to_string(&tree)?)
        }))
    }

    /// Lists the immediate children of one in-archive directory (the root
    /// when `dir` is absent), directories suffixed with `/`. A non-root
    /// directory that matches nothing is a not-found report.
    pub fn list_dir(
        &self,
        ctx: &ScriptContext,
        path: &str,
        dir: Option<&str>,
    ) -> Result<Option<Vec<String>>, PermissionViolation> {
        let vpath = match self.rewrite_arg(ctx, path, "archive") {
            Ok(v) => v,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(None);
            }
        };
        self.require_read(ctx, &vpath)?;

        Ok(self.run_value(|| {
            let resolved = self.vfs.resolve(&vpath, ctx.principal().username())?;
            zipview::list_dir(&resolved.rpath, dir.unwrap_or(""))
        }))
    }

    /// Extracts one named entry into the transient namespace and returns its
    /// new virtual path (`tmp:/<base name>`).
    ///
    /// The transient area is scratch space: a second extraction of an entry
    /// with the same base name overwrites the previous transient file.
    pub fn entry_to_temp(
        &self,
        ctx: &ScriptContext,
        path: &str,
        entry: &str,
    ) -> Result<Option<VirtualPath>, PermissionViolation> {
        let vpath = match self.rewrite_arg(ctx, path, "archive") {
            Ok(v) => v,
            Err(err) => {
                self.reporter.report(&err);
                return Ok(None);
            }
        };
        self.require_read(ctx, &vpath)?;

        Ok(self.run_value(|| {
            let username = ctx.principal().username();
            let resolved = self.vfs.resolve(&vpath, username)?;

            let base = entry.trim_end_matches(['/', '\\']);
            let base = base
                .rsplit(['/', '\\'])
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    OpError::InvalidArgument(format!("entry name '{entry}' has no base name"))
                })?;

            let tmp_fsh = self.vfs.handler(TRANSIENT_NAMESPACE).ok_or_else(|| {
                OpError::Resolve(format!("unknown namespace '{TRANSIENT_NAMESPACE}:/'"))
            })?;
            let tmp_vpath = VirtualPath::new(format!("{TRANSIENT_NAMESPACE}:/{base}"));
            let tmp_rpath = tmp_fsh
                .filesystem
                .virtual_path_to_real_path(&tmp_vpath, username)?;

            let mut bytes = Vec::new();
            zipview::extract_entry(&resolved.rpath, entry, &mut bytes)?;
            tmp_fsh
                .filesystem
                .write_stream(&tmp_rpath, &mut bytes.as_slice(), TRANSIENT_FILE_MODE)
                .map_err(|e| OpError::io(e, &tmp_rpath))?;

            owner::assign_single(&self.vfs, &tmp_vpath, ctx.principal());
            Ok(tmp_vpath)
        }))
    }
}

/// Outcome of the create-call gate: fatal violations abort, everything else
/// is reported and collapsed to the falsy return.
enum GateOutcome {
    Fatal(PermissionViolation),
    Recoverable(OpError),
}

struct GatedCreate {
    source_vpaths: Vec<VirtualPath>,
    dest_vpath: VirtualPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_arg_normalizes_once() {
        assert_eq!(SourceArg::from("user:/a").into_paths(), vec!["user:/a"]);
        assert_eq!(
            SourceArg::from(vec!["user:/a", "user:/b"]).into_paths(),
            vec!["user:/a", "user:/b"]
        );
        assert!(SourceArg::Many(Vec::new()).into_paths().is_empty());
    }
}
