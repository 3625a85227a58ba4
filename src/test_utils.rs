//! Shared test utilities: scripted collaborators and proptest generators.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;

use crate::config::Config;
use crate::notify::{Notification, Notifier};
use crate::process::{CommandOutput, CommandSpec, ProcessError, ProcessRunner};
use crate::types::BranchName;

type Rule = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput, ProcessError> + Send + Sync>;

/// A [`ProcessRunner`] that records every command and answers from rules.
///
/// A rule matches when its keyword equals the program or any argument. The
/// first matching rule wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Rule)>,
    calls: Mutex<Vec<CommandSpec>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        keyword: impl Into<String>,
        rule: impl Fn(&CommandSpec) -> Result<CommandOutput, ProcessError> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push((keyword.into(), Box::new(rule)));
        self
    }

    /// Makes every command take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands rendered as `program arg arg ...`.
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }

    /// Highest number of commands that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.rules
            .iter()
            .find(|(keyword, _)| spec.program == *keyword || spec.args.iter().any(|a| a == keyword))
            .map(|(_, rule)| rule(spec))
            .unwrap_or_else(|| Ok(CommandOutput::ok("")))
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(
        &self,
        spec: CommandSpec,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send {
        async move {
            self.calls.lock().unwrap().push(spec.clone());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let result = self.answer(&spec);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}

/// Rule for `git clone`: creates the destination with the given files.
pub fn clone_creating(
    files: &'static [&'static str],
) -> impl Fn(&CommandSpec) -> Result<CommandOutput, ProcessError> + Send + Sync + 'static {
    move |spec| {
        let dest = PathBuf::from(spec.args.last().expect("clone destination"));
        std::fs::create_dir_all(dest.join(".git")).unwrap();
        for file in files {
            std::fs::write(dest.join(file), "").unwrap();
        }
        Ok(CommandOutput::ok(""))
    }
}

/// Rule for a site generator: writes `<cwd>/<out_dir>/index.html`.
pub fn build_writing(
    out_dir: &'static str,
    body: &'static str,
) -> impl Fn(&CommandSpec) -> Result<CommandOutput, ProcessError> + Send + Sync + 'static {
    move |spec| {
        let out = spec.cwd.as_ref().expect("build cwd").join(out_dir);
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("index.html"), body).unwrap();
        Ok(CommandOutput::ok("built"))
    }
}

/// A [`Notifier`] that keeps everything it is given.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// `(branch, state)` pairs in delivery order.
    pub fn states(&self) -> Vec<(String, &'static str)> {
        self.notifications()
            .into_iter()
            .map(|n| (n.branch.to_string(), n.state))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> impl Future<Output = ()> + Send {
        self.sent.lock().unwrap().push(notification);
        std::future::ready(())
    }
}

/// Configuration rooted at `data_dir` with a fixed secret and domain.
pub fn test_config(data_dir: &Path) -> Config {
    Config::new("example.com", b"It's a Secret to Everybody".to_vec()).with_data_dir(data_dir)
}

/// Writes `<html_root>/<slot>/index.html` as if a build had been published.
pub fn seed_deployment(config: &Config, branch: &BranchName, body: &str) {
    let slot = config.paths.html_root.join(branch.slot_name());
    std::fs::create_dir_all(&slot).unwrap();
    std::fs::write(slot.join("index.html"), body).unwrap();
}

// ─── Strategies ───

pub fn arb_branch_name() -> impl Strategy<Value = BranchName> {
    "[a-z][a-z0-9-]{0,20}(/[a-z0-9][a-z0-9._-]{0,12}){0,2}"
        .prop_map(|s| BranchName::parse(s).unwrap())
}

/// A single DNS label usable as a branch subdomain.
pub fn arb_host_label() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,20}".prop_map(String::from)
}
