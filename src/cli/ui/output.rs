use console::style;

/// Styled status lines; all go to stderr so stdout stays machine-readable
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        eprintln!("{} {}", style("✓").green(), message);
    }

    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
