use console::{Emoji, style};

use crate::core::orchestrator::JobEvent;

pub static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_banner() {
    println!();
    println!(
        "{}",
        style("prd-review").bold().cyan()
    );
    println!(
        "{}\n",
        style("Research-grounded reviews for product requirement documents.").dim()
    );
}

/// One line per event on stderr, so stdout stays free for the report.
pub fn print_event(event: &JobEvent) {
    match event {
        JobEvent::Status { message, .. } => {
            eprintln!(
                "{} {} {}",
                style(event.timestamp().format("%H:%M:%S")).dim(),
                SPARKLE,
                style(message).bold()
            );
        }
        JobEvent::Log { message, .. } => {
            eprintln!("   {}", style(message).dim());
        }
        JobEvent::Section {
            section_name,
            score,
            degraded,
            sources,
            ..
        } => {
            let label = format!("{} ({}/5)", section_name, score);
            if *degraded {
                eprintln!("{} {} degraded", WARN_ICON, style(label).yellow());
            } else {
                eprintln!(
                    "{} {} {} sources",
                    LOOKING_GLASS,
                    style(label).green(),
                    sources.len()
                );
            }
        }
        JobEvent::FinalReport {
            aggregate_score, ..
        } => {
            eprintln!(
                "{} {}",
                SUCCESS_ICON,
                style(format!("Report ready, overall score {}/5", aggregate_score))
                    .green()
                    .bold()
            );
        }
        JobEvent::Error { message, .. } => print_error(message),
    }
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Text(String),
    Blank,
}

/// A titled block of aligned help or status lines.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self
            .lines
            .iter()
            .filter_map(|l| match l {
                GuideLine::Command(name, _) => Some(name.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        for line in &self.lines {
            match line {
                GuideLine::Command(name, description) => println!(
                    "   {}  {}",
                    style(format!("{:<width$}", name, width = width)).green(),
                    description
                ),
                GuideLine::Status(label, value) => {
                    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), value)
                }
                GuideLine::Text(text) => println!("   {}", text),
                GuideLine::Blank => println!(),
            }
        }
    }
}
