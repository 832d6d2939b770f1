use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use depwarden_core::Severity;
use depwarden_executor::{AutoUpgradeReport, FinalStatus, UpgradeCheckpoint};
use depwarden_policy::{Decision, DependencyPolicy, PolicyViolation};
use depwarden_resolver::ConflictAnalysisReport;

use crate::pipeline::PipelineReport;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{line}");
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal())
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        "info" => "[INFO]",
        _ => "[..]",
    }
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn severity_status(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "err",
        Severity::Warning => "warn",
        Severity::Info => "info",
    }
}

fn final_status_badge(status: FinalStatus) -> &'static str {
    match status {
        FinalStatus::Success => "ok",
        FinalStatus::Partial => "warn",
        FinalStatus::Failed | FinalStatus::RolledBack => "err",
    }
}

fn or_unknown(version: Option<&str>) -> &str {
    version.unwrap_or("unknown")
}

pub(crate) fn format_policy_lines(policy: &DependencyPolicy) -> Vec<String> {
    let mut lines = vec![
        format!("default_allowed: {}", policy.default_allowed),
        format!(
            "default_upgrade_cadence_days: {}",
            policy
                .default_upgrade_cadence_days
                .map(|days| days.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
        format!("max_major_version_jump: {}", policy.max_major_version_jump),
        format!("require_security_review: {}", policy.require_security_review),
        format!("allow_pre_releases: {}", policy.allow_pre_releases),
        format!(
            "python_version_requirement: {}",
            policy.python_version_requirement.as_deref().unwrap_or("none")
        ),
    ];

    for (name, package) in &policy.allowlist {
        let mut details = Vec::new();
        if let Some(floor) = &package.version_floor {
            details.push(format!("floor={floor}"));
        }
        if let Some(ceiling) = &package.version_ceiling {
            details.push(format!("ceiling={ceiling}"));
        }
        if !package.blocked_versions.is_empty() {
            let blocked: Vec<String> = package
                .blocked_versions
                .iter()
                .map(ToString::to_string)
                .collect();
            details.push(format!("blocked={}", blocked.join(",")));
        }
        if !package.allowed_versions.is_empty() {
            details.push(format!("allowed_versions={}", package.allowed_versions.len()));
        }
        if let Some(days) = package.upgrade_cadence_days {
            details.push(format!("cadence={days}d"));
        }
        if package.requires_review {
            details.push("review".to_string());
        }
        lines.push(if details.is_empty() {
            format!("allow {name}")
        } else {
            format!("allow {name} ({})", details.join(" "))
        });
    }

    for (name, package) in &policy.denylist {
        match &package.reason {
            Some(reason) => lines.push(format!("deny {name}: {reason}")),
            None => lines.push(format!("deny {name}")),
        }
    }

    lines
}

pub(crate) fn format_decision_line(style: OutputStyle, subject: &str, decision: &Decision) -> String {
    match decision.reason() {
        None => render_status_line(style, "ok", &format!("{subject}: allowed")),
        Some(rejection) => {
            render_status_line(style, "err", &format!("{subject}: rejected ({rejection})"))
        }
    }
}

pub(crate) fn format_violation_line(style: OutputStyle, violation: &PolicyViolation) -> String {
    render_status_line(
        style,
        severity_status(violation.severity),
        &format!(
            "{} {}: {}",
            violation.package, violation.violation_type, violation.message
        ),
    )
}

pub(crate) fn format_conflict_lines(
    style: OutputStyle,
    report: &ConflictAnalysisReport,
) -> Vec<String> {
    if report.conflicts.is_empty() {
        return vec![render_status_line(style, "ok", "no dependency conflicts")];
    }

    let mut lines = Vec::new();
    for conflict in &report.conflicts {
        let auto = if conflict.auto_resolvable {
            " (auto-resolvable)"
        } else {
            ""
        };
        lines.push(render_status_line(
            style,
            severity_status(conflict.severity),
            &format!("{}: version conflict{auto}", conflict.package),
        ));
        for constraint in &conflict.conflicting_constraints {
            let kind = if constraint.is_direct {
                "direct"
            } else {
                "transitive"
            };
            lines.push(format!(
                "  {} required by {} [{kind}]",
                constraint.constraint, constraint.required_by
            ));
        }
        for suggestion in &conflict.resolution_suggestions {
            lines.push(format!("  hint: {suggestion}"));
        }
    }

    for resolution in &report.resolutions {
        lines.push(format!(
            "resolution {}: {} (confidence {:.1})",
            resolution.package, resolution.description, resolution.confidence
        ));
        for command in &resolution.commands {
            lines.push(format!("  $ {command}"));
        }
    }

    let summary = &report.summary;
    lines.push(format!(
        "{} conflict(s): {} error(s), {} warning(s), {} auto-resolvable",
        summary.total_conflicts, summary.errors, summary.warnings, report.auto_resolvable_count
    ));
    lines
}

pub(crate) fn format_execution_lines(style: OutputStyle, report: &AutoUpgradeReport) -> Vec<String> {
    let mut lines = Vec::new();
    for result in &report.upgrades {
        let line = if result.success {
            render_status_line(
                style,
                "ok",
                &format!(
                    "upgraded {} {} -> {} ({:.1}s)",
                    result.package,
                    or_unknown(result.previous_version.as_deref()),
                    or_unknown(result.new_version.as_deref()),
                    result.duration_s
                ),
            )
        } else {
            render_status_line(
                style,
                "err",
                &format!(
                    "failed {}: {}",
                    result.package,
                    result.error_message.as_deref().unwrap_or("unknown error")
                ),
            )
        };
        lines.push(line);
    }

    if report.rollback_performed {
        lines.push(render_status_line(
            style,
            "warn",
            "lockfile rolled back to the pre-run checkpoint",
        ));
    }

    let summary = &report.summary;
    lines.push(render_status_line(
        style,
        final_status_badge(report.final_status),
        &format!(
            "status: {} ({}/{} succeeded, {} batch(es), {} checkpoint(s))",
            report.final_status,
            summary.successful,
            summary.total,
            summary.batches,
            summary.checkpoints
        ),
    ));
    lines
}

pub(crate) fn format_pipeline_lines(style: OutputStyle, report: &PipelineReport) -> Vec<String> {
    let mut lines = Vec::new();
    let plan = &report.plan;

    for evaluation in plan.screening.approved.iter().chain(&plan.screening.blocked) {
        for violation in &evaluation.violations {
            lines.push(format_violation_line(style, violation));
        }
    }
    for held in &plan.held_back {
        lines.push(render_status_line(
            style,
            "warn",
            &format!("held back {}: {}", held.package, held.reason),
        ));
    }

    match &report.execution {
        Some(execution) => lines.extend(format_execution_lines(style, execution)),
        None => lines.push(render_status_line(style, "info", "nothing executed")),
    }
    lines
}

pub(crate) fn format_checkpoint_lines(
    style: OutputStyle,
    checkpoints: &[UpgradeCheckpoint],
) -> Vec<String> {
    if checkpoints.is_empty() {
        return vec!["no checkpoints recorded".to_string()];
    }

    checkpoints
        .iter()
        .map(|checkpoint| {
            let packages = if checkpoint.packages_upgraded.is_empty() {
                "initial".to_string()
            } else {
                checkpoint.packages_upgraded.join(",")
            };
            let backup = checkpoint
                .lock_file_backup
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "no backup".to_string());
            render_status_line(
                style,
                if checkpoint.success { "ok" } else { "err" },
                &format!(
                    "{} {packages} {backup}",
                    checkpoint.timestamp.to_rfc3339()
                ),
            )
        })
        .collect()
}
