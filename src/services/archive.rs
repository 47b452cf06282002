use crate::domain::{ArchiveTarget, ServiceManifest};
use anyhow::{Context, Result, bail};
use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive one target subtree of a service into a dated gzipped
/// tarball under the destination directory.
pub struct Archiver<'a> {
    target: &'a ArchiveTarget,
    root: PathBuf,
    dest_dir: PathBuf,
}

impl<'a> Archiver<'a> {
    pub fn new(target: &'a ArchiveTarget, root: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            target,
            root: root.into(),
            dest_dir: dest_dir.into(),
        }
    }

    /// The archive file name for this target, dated with today's date.
    fn archive_name(&self) -> String {
        let date = Local::now().format("%Y%m%d");
        format!("{}-{}.tar.gz", self.target.name, date)
    }

    /// Select the files to archive, honoring the target's include and
    /// exclude globs. Paths are returned relative to the target root,
    /// sorted for a stable archive layout.
    fn select_files(&self) -> Result<Vec<PathBuf>> {
        let mut overrides = OverrideBuilder::new(&self.root);
        for pattern in &self.target.include {
            overrides
                .add(pattern)
                .with_context(|| format!("bad include glob '{pattern}'"))?;
        }
        for pattern in &self.target.exclude {
            overrides
                .add(&format!("!{pattern}"))
                .with_context(|| format!("bad exclude glob '{pattern}'"))?;
        }
        let overrides = overrides.build().context("compiling archive globs")?;

        let mut files = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .overrides(overrides)
            .build();
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_some_and(|ty| ty.is_file()) {
                let relative = entry
                    .path()
                    .strip_prefix(&self.root)
                    .expect("walked path is under its root")
                    .to_path_buf();
                files.push(relative);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Write the archive. Selecting zero files is an error: an empty
    /// tarball hides a misconfigured target.
    pub fn archive(&self) -> Result<PathBuf> {
        let files = self
            .select_files()
            .with_context(|| format!("selecting files under {:?}", self.root))?;
        if files.is_empty() {
            bail!("no files to archive at {:?}", self.root);
        }

        let dest = self.dest_dir.join(self.archive_name());
        let file = File::create(&dest).with_context(|| format!("creating {:?}", dest))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for relative in &files {
            let path = self.root.join(relative);
            builder
                .append_path_with_name(&path, relative)
                .with_context(|| format!("archiving {:?}", path))?;
            debug!("added {:?}", relative);
        }

        let encoder = builder.into_inner().context("finishing archive")?;
        encoder.finish().context("flushing archive")?;
        info!("archive written to {:?}", dest);
        Ok(dest)
    }
}

/// Archive every target the manifest declares, returning the written
/// archive paths. The first failing target aborts the rest.
pub fn archive_service(manifest: &ServiceManifest) -> Result<Vec<PathBuf>> {
    let dest_dir = manifest.archive_dir();
    fs::create_dir_all(&dest_dir).with_context(|| format!("creating {:?}", dest_dir))?;

    let mut written = Vec::with_capacity(manifest.archive.len());
    for target in &manifest.archive {
        let root = manifest.manifest_dir().join(&target.target);
        let dest = Archiver::new(target, root, &dest_dir)
            .archive()
            .with_context(|| format!("archiving target '{}'", target.name))?;
        written.push(dest);
    }
    Ok(written)
}
