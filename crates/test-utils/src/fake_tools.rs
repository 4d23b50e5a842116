#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use repovisor::provision::{ToolInvocation, ToolOutput, ToolRunner};

/// Stand-in for the external fetch and install tools.
///
/// - A fetch (`program == fetch_program`) looks up the source reference in
///   the registered repos and writes its files into the target directory,
///   which is the last argument. Unknown sources fail like `git` would.
/// - Any other program is treated as an installer and succeeds unless it
///   was marked as failing.
/// - Every invocation is recorded.
#[derive(Clone)]
pub struct FakeToolRunner {
    fetch_program: String,
    repos: Arc<Mutex<HashMap<String, Vec<(String, String)>>>>,
    failing_programs: Arc<Mutex<HashSet<String>>>,
    fetch_delay: Option<Duration>,
    calls: Arc<Mutex<Vec<ToolInvocation>>>,
}

impl FakeToolRunner {
    pub fn new() -> Self {
        Self {
            fetch_program: "git".to_string(),
            repos: Arc::new(Mutex::new(HashMap::new())),
            failing_programs: Arc::new(Mutex::new(HashSet::new())),
            fetch_delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register `files` (name, contents) as the content of `source_ref`.
    pub fn with_repo(self, source_ref: &str, files: &[(&str, &str)]) -> Self {
        self.repos.lock().unwrap().insert(
            source_ref.to_string(),
            files
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        );
        self
    }

    /// Make every run of `program` exit with status 1.
    pub fn failing(self, program: &str) -> Self {
        self.failing_programs
            .lock()
            .unwrap()
            .insert(program.to_string());
        self
    }

    /// Sleep this long before completing a fetch.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }

    fn fail(code: i32, stderr: &str) -> ToolOutput {
        ToolOutput {
            success: false,
            exit_code: Some(code),
            stderr_tail: stderr.to_string(),
        }
    }

    fn ok() -> ToolOutput {
        ToolOutput {
            success: true,
            exit_code: Some(0),
            stderr_tail: String::new(),
        }
    }

    fn fetch(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput> {
        let (Some(source_ref), Some(dir)) = (
            invocation.args.iter().rev().nth(1),
            invocation.args.last(),
        ) else {
            return Ok(Self::fail(129, "usage: fetch <source> <dir>"));
        };

        let files = self.repos.lock().unwrap().get(source_ref).cloned();
        let Some(files) = files else {
            return Ok(Self::fail(
                128,
                &format!("fatal: repository '{source_ref}' not found"),
            ));
        };

        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        for (name, contents) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }
        Ok(Self::ok())
    }
}

impl Default for FakeToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner for FakeToolRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a ToolInvocation,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolOutput>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(invocation.clone());

            if self
                .failing_programs
                .lock()
                .unwrap()
                .contains(&invocation.program)
            {
                return Ok(Self::fail(1, &format!("{} failed", invocation.program)));
            }

            if invocation.program == self.fetch_program {
                if let Some(delay) = self.fetch_delay {
                    tokio::time::sleep(delay).await;
                }
                return self.fetch(invocation);
            }

            Ok(Self::ok())
        })
    }
}
