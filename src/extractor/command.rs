use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One extractor invocation: a program plus its argv, no shell involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractorCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExtractorCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().to_string();
        self.arg(arg)
    }

    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for ExtractorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_display() {
        let command = ExtractorCommand::new("/opt/tools/drtu")
            .path_arg(Path::new("/data/line 1.dt"))
            .arg("-TBEGIN=24/03/01 10:00:00");

        assert_eq!(command.args.len(), 2);
        assert_eq!(command.tool_name(), "drtu");
        assert_eq!(
            command.to_string(),
            "/opt/tools/drtu \"/data/line 1.dt\" \"-TBEGIN=24/03/01 10:00:00\""
        );
    }
}
