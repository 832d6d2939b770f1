use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use depwarden_core::UpgradeCandidate;
use depwarden_executor::{
    read_checkpoint_journal, CliPackageManager, ExecutorOptions, FinalStatus, ProjectLayout,
    SafeUpgradeExecutor,
};
use depwarden_policy::{load_policy, PolicyEngine, DEFAULT_POLICY_PATH};
use depwarden_resolver::ConflictResolver;
use serde::Serialize;

use crate::pipeline::{
    load_declarations, load_lock_data, plan_upgrades, run_upgrade_pipeline, PipelineReport,
    PYPROJECT_FILE,
};
use crate::render::{
    format_checkpoint_lines, format_conflict_lines, format_decision_line, format_pipeline_lines,
    format_policy_lines, format_violation_line, TerminalRenderer,
};
use crate::{Cli, Commands, PolicyCommands, UpgradeArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::current();
    let policy_path = resolve_policy_path(&cli.project_root, cli.policy.as_deref());

    match cli.command {
        Commands::Policy { command } => {
            let engine = PolicyEngine::new(load_policy(&policy_path));
            match command {
                PolicyCommands::Show { json } => {
                    if json {
                        print_json(engine.policy())?;
                    } else {
                        renderer.print_section("policy");
                        renderer.print_lines(&format_policy_lines(engine.policy()));
                    }
                }
                PolicyCommands::Check {
                    package,
                    version,
                    current,
                } => run_policy_check(
                    &engine,
                    renderer,
                    &package,
                    version.as_deref(),
                    current.as_deref(),
                )?,
            }
        }
        Commands::Conflicts {
            pyproject,
            no_lock,
            candidates,
            aggressive,
            json,
        } => {
            let declarations_path =
                pyproject.unwrap_or_else(|| cli.project_root.join(PYPROJECT_FILE));
            let declarations = load_declarations(&declarations_path)?;
            let lock = if no_lock {
                None
            } else {
                load_lock_data(&cli.project_root.join(&cli.lockfile))?
            };
            let candidates = parse_candidates(&candidates)?;

            let report = ConflictResolver::new(!aggressive).analyze_with_candidates(
                &declarations,
                lock.as_ref(),
                &candidates,
            );
            if json {
                print_json(&report)?;
            } else {
                renderer.print_section("conflicts");
                renderer.print_lines(&format_conflict_lines(renderer.style(), &report));
            }
        }
        Commands::Upgrade(args) => {
            let layout =
                project_layout(&cli.project_root, &cli.lockfile, args.backup_dir.as_deref());
            run_upgrade(&cli.project_root, &policy_path, layout, args, renderer)?;
        }
        Commands::Checkpoints { backup_dir, json } => {
            let layout = project_layout(&cli.project_root, &cli.lockfile, backup_dir.as_deref());
            let checkpoints = read_checkpoint_journal(&layout)?;
            if json {
                print_json(&checkpoints)?;
            } else {
                renderer.print_section("checkpoints");
                renderer.print_lines(&format_checkpoint_lines(renderer.style(), &checkpoints));
            }
        }
    }

    Ok(())
}

fn resolve_policy_path(project_root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => project_root.join(DEFAULT_POLICY_PATH),
    }
}

fn project_layout(project_root: &Path, lockfile: &str, backup_dir: Option<&Path>) -> ProjectLayout {
    let layout = ProjectLayout::new(project_root).with_lockfile_name(lockfile);
    match backup_dir {
        Some(dir) => layout.with_backup_dir(dir),
        None => layout,
    }
}

fn parse_candidates(specs: &[String]) -> Result<Vec<UpgradeCandidate>> {
    specs
        .iter()
        .map(|spec| UpgradeCandidate::parse_spec(spec))
        .collect()
}

fn run_policy_check(
    engine: &PolicyEngine,
    renderer: TerminalRenderer,
    package: &str,
    version: Option<&str>,
    current: Option<&str>,
) -> Result<()> {
    match (version, current) {
        (Some(target), Some(current)) => {
            let violations = engine.check_upgrade_allowed(package, current, target);
            if violations.is_empty() {
                renderer.print_status("ok", &format!("{package} {current} -> {target}: allowed"));
                return Ok(());
            }
            for violation in &violations {
                println!("{}", format_violation_line(renderer.style(), violation));
            }
            if violations.iter().any(|violation| violation.is_blocking()) {
                return Err(anyhow!("upgrade of {package} to {target} is blocked by policy"));
            }
            Ok(())
        }
        (None, Some(_)) => Err(anyhow!("--current requires --version")),
        (Some(version), None) => {
            let decision = engine.check_version_allowed(package, version);
            println!(
                "{}",
                format_decision_line(renderer.style(), &format!("{package} {version}"), &decision)
            );
            if decision.is_allowed() {
                Ok(())
            } else {
                Err(anyhow!("{package} {version} is not allowed by policy"))
            }
        }
        (None, None) => {
            let decision = engine.check_package_allowed(package);
            println!("{}", format_decision_line(renderer.style(), package, &decision));
            if decision.is_allowed() {
                Ok(())
            } else {
                Err(anyhow!("{package} is not allowed by policy"))
            }
        }
    }
}

fn run_upgrade(
    project_root: &Path,
    policy_path: &Path,
    layout: ProjectLayout,
    args: UpgradeArgs,
    renderer: TerminalRenderer,
) -> Result<()> {
    let candidates = parse_candidates(&args.specs)?;
    let declarations_path = args
        .pyproject
        .clone()
        .unwrap_or_else(|| project_root.join(PYPROJECT_FILE));
    let declarations = load_declarations(&declarations_path)?;
    let lock = load_lock_data(&layout.lockfile_path())?;

    let mut engine = PolicyEngine::new(load_policy(policy_path));
    let resolver = ConflictResolver::default().with_tool(args.program.clone());
    let plan = plan_upgrades(&engine, &resolver, &declarations, lock.as_ref(), &candidates);

    let report = if args.dry_run {
        PipelineReport {
            plan,
            execution: None,
        }
    } else {
        let package_manager = CliPackageManager::new(args.program.clone(), project_root);
        let options = ExecutorOptions {
            max_batch_size: args.batch_size,
            enable_health_checks: !args.no_health_checks,
        };
        let executor = SafeUpgradeExecutor::new(layout, package_manager, options);
        run_upgrade_pipeline(&mut engine, plan, &executor, !args.no_rollback)
    };

    match &args.report {
        Some(path) => {
            write_json(path, &report)?;
            renderer.print_lines(&format_pipeline_lines(renderer.style(), &report));
            renderer.print_status("ok", &format!("report written to {}", path.display()));
        }
        None => print_json(&report)?,
    }

    match report.execution.as_ref().map(|execution| execution.final_status) {
        None | Some(FinalStatus::Success) => Ok(()),
        Some(status) => Err(anyhow!("upgrade run finished with status {status}")),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    fs::write(path, format!("{rendered}\n"))
        .with_context(|| format!("failed to write report: {}", path.display()))
}
