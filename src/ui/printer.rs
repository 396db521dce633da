use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::config::Mode;
use crate::core::models::{StageName, StageStatus};
use crate::core::modes::resolve_stages;
use crate::core::pipeline::RunSummary;
use crate::core::state::StageState;
use crate::executors::toolchain;
use crate::stages::tools_for;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(status: StageStatus) -> Cell {
    let color = match status {
        StageStatus::Success => Color::Green,
        StageStatus::Partial => Color::Yellow,
        StageStatus::Skipped => Color::DarkGrey,
        StageStatus::Failed => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

/// Stage → status table of a finished run.
pub fn stage_status_table(summary: &RunSummary) -> String {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Stage").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Directory").add_attribute(Attribute::Bold),
    ]);

    for stage in &summary.planned {
        let row = match summary.results.get(stage) {
            Some(result) => vec![
                Cell::new(stage.as_str()),
                status_cell(result.status),
                Cell::new(result.stage_dir.display().to_string()),
            ],
            None => {
                let state = summary.stage_states.get(stage).copied();
                let label = if state == Some(StageState::Skipped) {
                    "declined"
                } else {
                    "not run"
                };
                vec![
                    Cell::new(stage.as_str()),
                    Cell::new(label).fg(Color::DarkGrey),
                    Cell::new(""),
                ]
            }
        };
        table.add_row(row);
    }
    table.to_string()
}

pub fn print_summary(summary: &RunSummary) {
    let rule = "═══════════════════════════════════════".green().bold();
    println!("\n{}", rule);
    println!("{}", "Hawkeye Scan Complete".green().bold());
    println!("{}", rule);

    println!("\n{}: {}", "Target".cyan().bold(), summary.target);
    println!(
        "{}: {:.2} seconds ({:.2} minutes)",
        "Duration".cyan().bold(),
        summary.duration_seconds,
        summary.duration_seconds / 60.0
    );
    println!("{}: {}", "Results".cyan().bold(), summary.run_dir.display());

    if !summary.planned.is_empty() {
        println!("\n{}", stage_status_table(summary));
    }

    if !summary.reports.is_empty() {
        println!("\n{}", "Reports:".yellow().bold());
        for report in &summary.reports {
            println!("  • {}", report.display());
        }
    }
}

/// Mode → stages table and per-stage tool availability.
pub fn stage_table() -> String {
    let mut modes = new_table();
    modes.set_header(vec![
        Cell::new("Mode").add_attribute(Attribute::Bold),
        Cell::new("Stages").add_attribute(Attribute::Bold),
    ]);
    for mode in Mode::ALL {
        let stages: Vec<&str> = resolve_stages(mode).iter().map(|s| s.as_str()).collect();
        modes.add_row(vec![Cell::new(mode.as_str()), Cell::new(stages.join(" → "))]);
    }

    let mut tools = new_table();
    tools.set_header(vec![
        Cell::new("Stage").add_attribute(Attribute::Bold),
        Cell::new("Directory").add_attribute(Attribute::Bold),
        Cell::new("Tools").add_attribute(Attribute::Bold),
    ]);
    for stage in StageName::ALL {
        let availability: Vec<String> = toolchain::availability(tools_for(stage))
            .into_iter()
            .map(|(tool, found)| format!("{} {}", if found { "✓" } else { "✗" }, tool))
            .collect();
        tools.add_row(vec![
            Cell::new(stage.as_str()),
            Cell::new(stage.dir_name()),
            Cell::new(availability.join(", ")),
        ]);
    }

    format!("{}\n{}", modes, tools)
}

pub fn print_stage_table() {
    println!("{}", stage_table());
}
