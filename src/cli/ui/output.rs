use console::style;

/// Console status lines for interactive runs
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Indented `label: value` line under a header
    pub fn detail(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {} {}", style(format!("{}:", label)).dim(), value);
    }

    /// Follow-up hint printed under an error
    pub fn hint(&self, message: &str) {
        eprintln!("  {} {}", style("→").cyan(), style(message).italic());
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
