use colored::Colorize;
use reconcile::{RunReport, TaskReport, TaskStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run Reports
// ============================================================================

/// Symbol for a terminal task status
pub fn status_symbol(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Created => "+".green(),
        TaskStatus::Updated => "~".yellow(),
        TaskStatus::Unchanged => "=".dimmed(),
        TaskStatus::Failed => "✗".red(),
        TaskStatus::Skipped => "-".dimmed(),
    }
}

/// Format milliseconds as a short duration
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

fn task_line(task: &TaskReport) {
    let mut line = format!("{} {}", status_symbol(task.status), task.key);
    if !task.changed_fields.is_empty() {
        line.push_str(&format!(" ({})", task.changed_fields.join(", ")));
    }
    if task.duration_ms > 0 {
        line.push_str(&format!(" {}", format_duration_ms(task.duration_ms).dimmed()));
    }
    println!("  {line}");

    for warning in &task.warnings {
        println!("      {} {}", "⚠".yellow(), warning);
    }
    if let Some(err) = &task.error {
        println!("      {} {}", "✗".red(), err);
        if let Some(category) = task.error_category {
            println!("        {} {}", "→".dimmed(), category.advice().dimmed());
        }
    }
    if let Some(blocked_by) = &task.blocked_by {
        println!("      {}", format!("blocked by {blocked_by}").dimmed());
    }
}

/// Print every task of a report and its summary line
pub fn print_report(report: &RunReport) {
    for task in &report.tasks {
        task_line(task);
    }
    print_summary(report);
}

pub fn print_summary(report: &RunReport) {
    let s = &report.summary;
    let counts = format!(
        "{} created, {} updated, {} unchanged, {} failed, {} skipped",
        s.created, s.updated, s.unchanged, s.failed, s.skipped
    );
    let elapsed = (report.finished_at - report.started_at)
        .num_milliseconds()
        .max(0) as u64;
    let msg = format!("{counts} in {}", format_duration_ms(elapsed));

    println!();
    if report.cancelled {
        warn(&format!("Run cancelled: {msg}"));
    } else if report.is_success() {
        success(&msg);
    } else {
        error(&msg);
    }
}
