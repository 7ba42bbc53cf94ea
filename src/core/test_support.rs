// src/core/test_support.rs

//! Test doubles shared by the unit tests of several modules.

use crate::system::executor::{CapturedOutput, ExecutionError, SpawnOptions, Spawner};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// One recorded process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub shell: bool,
}

/// A `Spawner` that records every invocation instead of running it.
///
/// By default every process "succeeds" and the path following `-o` is created,
/// so compile, link and fetch flows leave the files later steps look for.
#[derive(Debug)]
pub struct RecordingSpawner {
    calls: Mutex<Vec<SpawnCall>>,
    exit_code: i32,
    stdout: String,
    failing_programs: Vec<String>,
    create_outputs: bool,
}

impl Default for RecordingSpawner {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            exit_code: 0,
            stdout: String::new(),
            failing_programs: Vec::new(),
            create_outputs: true,
        }
    }
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured invocation prints `stdout`.
    pub fn with_stdout(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    /// Every invocation exits with `code` and creates nothing.
    pub fn failing_with(code: i32) -> Self {
        Self {
            exit_code: code,
            create_outputs: false,
            ..Self::default()
        }
    }

    /// Invocations of `program` (or shell lines starting with it) exit with 1.
    pub fn failing_program(mut self, program: &str) -> Self {
        self.failing_programs.push(program.to_string());
        self
    }

    /// Invocations succeed without creating their `-o` output.
    pub fn without_outputs(mut self) -> Self {
        self.create_outputs = false;
        self
    }

    pub fn calls(&self) -> Vec<SpawnCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<SpawnCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    fn record(&self, program: &str, args: &[String], options: &SpawnOptions<'_>) -> i32 {
        self.calls.lock().unwrap().push(SpawnCall {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: options.cwd.to_path_buf(),
            env: options.env.clone(),
            shell: options.shell,
        });

        let first_word = program.split_whitespace().next().unwrap_or("");
        if self.failing_programs.iter().any(|p| p == first_word) {
            return 1;
        }
        if self.exit_code == 0 && self.create_outputs {
            let output = args
                .iter()
                .position(|a| a == "-o")
                .and_then(|i| args.get(i + 1));
            if let Some(output) = output {
                let path = options.cwd.join(output);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, format!("output of {}", program)).unwrap();
            }
        }
        self.exit_code
    }
}

impl Spawner for RecordingSpawner {
    fn spawn(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<i32, ExecutionError> {
        Ok(self.record(program, args, options))
    }

    fn capture(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<CapturedOutput, ExecutionError> {
        let exit_code = self.record(program, args, options);
        Ok(CapturedOutput {
            exit_code,
            stdout: self.stdout.clone(),
        })
    }
}
