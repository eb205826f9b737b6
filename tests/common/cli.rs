use aisummary::source::SnapshotRecord;
use assert_cmd::Command;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug)]
pub struct AisumRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl AisumRun {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {}", self.stdout))
    }
}

/// A temporary working directory with a snapshot file and a database path.
pub struct AisumWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub db: PathBuf,
    pub issues: PathBuf,
}

impl AisumWorkspace {
    pub fn new(records: &[SnapshotRecord]) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        let db = root.join("summaries.db");
        let issues = root.join("issues.jsonl");

        let mut file = fs::File::create(&issues).expect("snapshot file");
        for record in records {
            serde_json::to_writer(&mut file, record).expect("write record");
            file.write_all(b"\n").expect("newline");
        }

        Self {
            temp_dir,
            root,
            db,
            issues,
        }
    }

    pub fn snapshot(&self) -> Vec<SnapshotRecord> {
        fs::read_to_string(&self.issues)
            .expect("read snapshot")
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).expect("record"))
            .collect()
    }
}

pub fn run_aisum<I, S>(workspace: &AisumWorkspace, args: I) -> AisumRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aisum"));
    cmd.current_dir(&workspace.root);
    cmd.arg("--db").arg(&workspace.db);
    cmd.arg("--issues").arg(&workspace.issues);
    cmd.args(args);
    cmd.env("HOME", &workspace.root);
    cmd.env("RUST_LOG", "aisummary=debug");
    cmd.env("NO_COLOR", "1");
    cmd.env("AISUM_ALLOWED_PROJECTS", "A");
    cmd.env("AISUM_IDENTITY", super::BOT_NAME);
    cmd.env_remove("AISUM_DB");
    cmd.env_remove("AISUM_ISSUES");

    let output = cmd.output().expect("run aisum");
    AisumRun {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status,
    }
}
