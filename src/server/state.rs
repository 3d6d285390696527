use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::pipeline::RegionTranslator;

pub(crate) const INPUT_FILE: &str = "input.pdf";
pub(crate) const OUTPUT_FILE: &str = "translated.pdf";

pub(crate) struct ServerState {
    pub(crate) pipeline: RegionTranslator,
    pub(crate) work_dir: PathBuf,
    /// One document at a time: every handler works on the same files.
    pub(crate) work_lock: Mutex<()>,
}

impl ServerState {
    pub(crate) fn new(pipeline: RegionTranslator, work_dir: PathBuf) -> Self {
        Self {
            pipeline,
            work_dir,
            work_lock: Mutex::new(()),
        }
    }

    pub(crate) fn input_path(&self) -> PathBuf {
        self.work_dir.join(INPUT_FILE)
    }

    pub(crate) fn output_path(&self) -> PathBuf {
        self.work_dir.join(OUTPUT_FILE)
    }
}
