use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tokio::process::Command;

use crate::builder::utils::run;

const BUILDER: &str = "html";

/// One `sphinx-build` invocation. The configuration lives next to the sources.
#[derive(Debug)]
pub(crate) struct SphinxBuild<'a> {
    pub(crate) executable: &'a str,
    pub(crate) source_dir: PathBuf,
    pub(crate) output_dir: PathBuf,
}

impl SphinxBuild<'_> {
    pub(crate) fn doctree_dir(&self) -> PathBuf {
        self.output_dir.join("doctrees")
    }

    fn args(&self) -> Vec<OsString> {
        vec![
            "-b".into(),
            BUILDER.into(),
            "-c".into(),
            self.source_dir.clone().into(),
            "-d".into(),
            self.doctree_dir().into(),
            self.source_dir.clone().into(),
            self.output_dir.clone().into(),
        ]
    }

    pub(crate) async fn run(&self, work_dir: &Path) -> anyhow::Result<()> {
        let mut command = Command::new(self.executable);
        command.current_dir(work_dir).args(self.args());
        run(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let build = SphinxBuild {
            executable: "sphinx-build",
            source_dir: PathBuf::from("/tmp/conda/docs/source"),
            output_dir: PathBuf::from("/tmp/conda/pr-42"),
        };

        let args: Vec<OsString> = [
            "-b",
            "html",
            "-c",
            "/tmp/conda/docs/source",
            "-d",
            "/tmp/conda/pr-42/doctrees",
            "/tmp/conda/docs/source",
            "/tmp/conda/pr-42",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        assert_eq!(build.args(), args);
    }
}
