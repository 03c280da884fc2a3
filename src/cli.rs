use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::backends::{validate_workdir, CliBackend, ProviderKind};
use crate::config::{Config, OutputFormat};
use crate::error::TriageError;
use crate::executor::BoundedExecutor;
use crate::jenkins::{build_url, JenkinsClient};
use crate::models::{AnalysisReport, AnalysisStatus, BuildAnalysisNode};
use crate::output;
use crate::tracker::{attach_issue_matches, IssueTracker, JiraClient};

#[derive(Parser)]
#[command(name = "citriage")]
#[command(author, version, about = "AI-assisted Jenkins failure triage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a failed Jenkins build and its failed children
    Analyze {
        /// Jenkins job name (folders as 'folder/job-name')
        #[arg(short, long)]
        job: String,

        /// Build number to analyze
        #[arg(short, long)]
        build: u32,

        #[arg(long, env = "JENKINS_URL")]
        jenkins_url: Option<String>,

        #[arg(long, env = "JENKINS_USER")]
        jenkins_user: Option<String>,

        #[arg(long, env = "JENKINS_TOKEN")]
        jenkins_token: Option<String>,

        /// AI provider: claude, gemini, or cursor
        #[arg(long, env = "AI_PROVIDER")]
        provider: Option<String>,

        /// Model identifier passed to the provider CLI
        #[arg(long, env = "AI_MODEL")]
        model: Option<String>,

        /// Maximum recursion depth into failed child builds
        #[arg(long)]
        max_depth: Option<usize>,

        /// Existing checkout the backend may explore for code context
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
}

impl Cli {
    #[allow(clippy::too_many_arguments)]
    async fn execute_analyze(
        &self,
        job: &str,
        build: u32,
        jenkins_url: Option<&str>,
        jenkins_user: Option<&str>,
        jenkins_token: Option<&str>,
        provider: Option<&str>,
        model: Option<&str>,
        max_depth: Option<usize>,
        workdir: Option<&Path>,
    ) -> Result<()> {
        let mut config = Config::load(self.config.as_deref())?;

        // Command line and environment override the config file.
        if let Some(url) = jenkins_url {
            config.jenkins.url = Some(url.to_string());
        }
        if let Some(user) = jenkins_user {
            config.jenkins.user = Some(user.to_string());
        }
        if let Some(token) = jenkins_token {
            config.jenkins.token = Some(token.to_string());
        }
        if let Some(provider) = provider {
            config.backend.provider = Some(provider.to_string());
        }
        if let Some(model) = model {
            config.backend.model = Some(model.to_string());
        }
        if let Some(depth) = max_depth {
            config.analysis.max_depth = depth;
        }
        if let Some(dir) = workdir {
            config.backend.workdir = Some(dir.display().to_string());
        }

        let jenkins_base = config.jenkins.url.clone().context(
            "Jenkins URL not configured. Set JENKINS_URL, --jenkins-url, or jenkins.url",
        )?;
        let jenkins_user = config.jenkins.user.clone().context(
            "Jenkins user not configured. Set JENKINS_USER, --jenkins-user, or jenkins.user",
        )?;
        let jenkins_token = config.jenkins.token.clone().context(
            "Jenkins token not configured. Set JENKINS_TOKEN, --jenkins-token, or jenkins.token",
        )?;
        let provider: ProviderKind = config
            .backend
            .provider
            .as_deref()
            .context("No AI provider configured. Set AI_PROVIDER, --provider, or backend.provider")?
            .parse()?;
        let model = config.backend.model.clone().unwrap_or_default();

        info!("Analyzing {job} #{build} with {provider} backend");

        let jenkins = JenkinsClient::new(
            &jenkins_base,
            &jenkins_user,
            &jenkins_token,
            config.jenkins.ssl_verify,
        )?;
        let backend = CliBackend::new(provider, model.clone(), config.backend.timeout_minutes)?;
        let backend_workdir =
            validate_workdir(config.backend.workdir.as_deref().map(Path::new))?;
        let executor = BoundedExecutor::new(config.analysis.max_concurrency);
        let analyzer = Analyzer::new(
            Arc::new(jenkins),
            Arc::new(backend),
            executor.clone(),
            config.analysis.max_depth,
            backend_workdir,
        );

        let started_at = Utc::now();
        let progress = output::PhaseProgress::start_analysis();
        let (status, mut root) = match analyzer.analyze(job, build).await {
            Ok(root) => (AnalysisStatus::Completed, root),
            // A misconfigured backend is reported as a failed run, not a
            // crash, so the result is still renderable and serializable.
            Err(TriageError::Backend(message)) => {
                let mut node =
                    BuildAnalysisNode::new(job, build, build_url(&jenkins_base, job, build));
                node.summary = Some(message);
                (AnalysisStatus::Failed, node)
            }
            Err(other) => return Err(other.into()),
        };

        let progress = progress.finish_analysis_start_cross_reference();
        if status == AnalysisStatus::Completed {
            let tracker = build_tracker(&config)?;
            attach_issue_matches(&mut root, tracker, &executor).await;
        }
        progress.finish();

        let report = AnalysisReport {
            job_id: uuid::Uuid::new_v4().to_string(),
            job_name: job.to_string(),
            build_number: build,
            url: root.url.clone(),
            status,
            backend: provider.to_string(),
            model,
            summary: root.summary.clone().unwrap_or_default(),
            started_at,
            finished_at: Utc::now(),
            root,
        };

        self.emit(&config, &report)
    }

    fn emit(&self, config: &Config, report: &AnalysisReport) -> Result<()> {
        let pretty = self.pretty || config.output.pretty;
        let json_output = if pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Analysis report written to: {}", output_path.display());
            return Ok(());
        }

        match config.output.format {
            OutputFormat::Json => println!("{}", json_output),
            OutputFormat::Summary => output::print_summary(report),
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Analyze {
                job,
                build,
                jenkins_url,
                jenkins_user,
                jenkins_token,
                provider,
                model,
                max_depth,
                workdir,
            } => {
                self.execute_analyze(
                    job,
                    *build,
                    jenkins_url.as_deref(),
                    jenkins_user.as_deref(),
                    jenkins_token.as_deref(),
                    provider.as_deref(),
                    model.as_deref(),
                    *max_depth,
                    workdir.as_deref(),
                )
                .await
            }
        }
    }
}

fn build_tracker(config: &Config) -> Result<Option<Arc<dyn IssueTracker>>> {
    if !config.tracker.enabled {
        return Ok(None);
    }
    let url = config
        .tracker
        .url
        .as_ref()
        .context("tracker.url must be set when tracker.enabled is true")?;
    let Some(auth) = config.tracker.auth() else {
        warn!("Tracker enabled but no credentials configured; skipping cross-reference");
        return Ok(None);
    };
    let client = JiraClient::new(
        url,
        config.tracker.project_key.clone(),
        config.tracker.max_results,
        auth,
        config.tracker.ssl_verify,
    )?;
    Ok(Some(Arc::new(client)))
}
