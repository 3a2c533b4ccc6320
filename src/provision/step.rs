//! Individual provisioning steps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One environment setup step, tagged by `kind` in plan files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Mkdir {
        path: String,
    },
    Clone {
        repo: String,
        dest: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    RunScript {
        script: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
    },
    /// Copy from the build context into the image
    Copy {
        src: String,
        dest: String,
    },
    PipInstall {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        packages: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        editable: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_index_url: Option<String>,
    },
    /// Run a code-generation script that writes derived files
    Generate {
        script: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        outputs: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
    },
    Chmod {
        paths: Vec<String>,
        /// Octal permission bits, e.g. "755"
        mode: String,
    },
}

/// A process invocation derived from a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a shell word when it holds anything beyond a conservative safe set
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

pub fn parse_mode(mode: &str) -> Option<u32> {
    u32::from_str_radix(mode.trim_start_matches("0o"), 8)
        .ok()
        .filter(|m| *m <= 0o7777)
}

impl Step {
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Mkdir { .. } => "mkdir",
            Step::Clone { .. } => "clone",
            Step::RunScript { .. } => "run_script",
            Step::Copy { .. } => "copy",
            Step::PipInstall { .. } => "pip_install",
            Step::Generate { .. } => "generate",
            Step::Chmod { .. } => "chmod",
        }
    }

    /// Paths inside the image this step needs to exist beforehand
    pub fn requires(&self, workdir: &Path) -> Vec<PathBuf> {
        match self {
            Step::RunScript { script, workdir: cwd, .. }
            | Step::Generate { script, workdir: cwd, .. } => {
                let cwd = cwd
                    .as_deref()
                    .map(|d| resolve(workdir, d))
                    .unwrap_or_else(|| workdir.to_path_buf());
                let mut paths = vec![resolve(&cwd, script)];
                if cwd != workdir {
                    paths.push(cwd);
                }
                paths
            }
            Step::PipInstall { editable, .. } => {
                editable.iter().map(|p| resolve(workdir, p)).collect()
            }
            Step::Chmod { paths, .. } => paths.iter().map(|p| resolve(workdir, p)).collect(),
            Step::Mkdir { .. } | Step::Clone { .. } | Step::Copy { .. } => Vec::new(),
        }
    }

    /// Paths inside the image this step creates
    pub fn provides(&self, workdir: &Path) -> Vec<PathBuf> {
        match self {
            Step::Mkdir { path } => vec![resolve(workdir, path)],
            Step::Clone { dest, .. } | Step::Copy { dest, .. } => vec![resolve(workdir, dest)],
            Step::Generate { outputs, workdir: cwd, .. } => {
                let cwd = cwd
                    .as_deref()
                    .map(|d| resolve(workdir, d))
                    .unwrap_or_else(|| workdir.to_path_buf());
                outputs.iter().map(|p| resolve(&cwd, p)).collect()
            }
            Step::RunScript { .. } | Step::PipInstall { .. } | Step::Chmod { .. } => Vec::new(),
        }
    }

    /// Describe what is missing, if anything
    pub fn incomplete(&self) -> Option<String> {
        match self {
            Step::Mkdir { path } if path.is_empty() => Some("empty path".to_string()),
            Step::Clone { repo, dest, .. } if repo.is_empty() || dest.is_empty() => {
                Some("repo and dest are required".to_string())
            }
            Step::RunScript { script, .. } | Step::Generate { script, .. } if script.is_empty() => {
                Some("script is required".to_string())
            }
            Step::Copy { src, dest } if src.is_empty() || dest.is_empty() => {
                Some("src and dest are required".to_string())
            }
            Step::PipInstall { packages, editable, .. } if packages.is_empty() && editable.is_empty() => {
                Some("nothing to install".to_string())
            }
            Step::Chmod { paths, .. } if paths.is_empty() => Some("no paths".to_string()),
            Step::Chmod { mode, .. } if parse_mode(mode).is_none() => {
                Some(format!("invalid mode `{}`", mode))
            }
            _ => None,
        }
    }

    /// Process to run for this step. `context` is the build context that
    /// `copy` sources are read from.
    pub fn command(&self, workdir: &Path, context: &Path) -> ShellCommand {
        let here = workdir.to_path_buf();
        match self {
            Step::Mkdir { path } => ShellCommand {
                program: "mkdir".to_string(),
                args: vec!["-p".to_string(), path.clone()],
                cwd: here,
            },
            Step::Clone { repo, dest, branch } => {
                let mut args = vec!["clone".to_string()];
                if let Some(branch) = branch {
                    args.push("--branch".to_string());
                    args.push(branch.clone());
                }
                args.push(repo.clone());
                args.push(dest.clone());
                ShellCommand {
                    program: "git".to_string(),
                    args,
                    cwd: here,
                }
            }
            Step::RunScript { script, args, workdir: cwd } => {
                let cwd = cwd.as_deref().map(|d| resolve(workdir, d)).unwrap_or(here);
                let mut full = vec![script.clone()];
                full.extend(args.iter().cloned());
                ShellCommand {
                    program: "bash".to_string(),
                    args: full,
                    cwd,
                }
            }
            Step::Copy { src, dest } => ShellCommand {
                program: "cp".to_string(),
                args: vec![
                    "-r".to_string(),
                    resolve(context, src).display().to_string(),
                    resolve(workdir, dest).display().to_string(),
                ],
                cwd: here,
            },
            Step::PipInstall {
                packages,
                editable,
                extra_index_url,
            } => ShellCommand {
                program: "python".to_string(),
                args: pip_args(packages, editable, extra_index_url.as_deref()),
                cwd: here,
            },
            Step::Generate { script, args, workdir: cwd, .. } => {
                let cwd = cwd.as_deref().map(|d| resolve(workdir, d)).unwrap_or(here);
                let mut full = vec![script.clone()];
                full.extend(args.iter().cloned());
                ShellCommand {
                    program: "python".to_string(),
                    args: full,
                    cwd,
                }
            }
            Step::Chmod { paths, mode } => {
                let mut args = vec![mode.trim_start_matches("0o").to_string()];
                args.extend(paths.iter().cloned());
                ShellCommand {
                    program: "chmod".to_string(),
                    args,
                    cwd: here,
                }
            }
        }
    }

    /// Dockerfile instruction for this step
    pub fn dockerfile_instruction(&self, workdir: &Path) -> String {
        match self {
            Step::Copy { src, dest } => format!("COPY {} {}", src, dest),
            Step::RunScript { workdir: Some(cwd), .. } | Step::Generate { workdir: Some(cwd), .. } => {
                let cmd = self.command(workdir, Path::new("."));
                format!("RUN cd {} && {}", shell_quote(cwd), cmd)
            }
            other => format!("RUN {}", other.command(workdir, Path::new("."))),
        }
    }
}

fn pip_args(packages: &[String], editable: &[String], extra_index_url: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
        "--no-cache-dir".to_string(),
    ];
    if let Some(url) = extra_index_url {
        args.push("--extra-index-url".to_string());
        args.push(url.to_string());
    }
    args.extend(packages.iter().cloned());
    for path in editable {
        args.push("-e".to_string());
        args.push(path.clone());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_yaml_tags() {
        let step: Step = serde_yaml::from_str(
            "kind: clone\nrepo: https://github.com/autogluon/autogluon.git\ndest: autogluon\n",
        )
        .unwrap();
        assert_eq!(step.kind(), "clone");
        assert!(serde_yaml::from_str::<Step>("kind: reboot\n").is_err());
    }

    #[test]
    fn test_requires_and_provides() {
        let workdir = Path::new("/opt/bench");
        let clone = Step::Clone {
            repo: "https://example.com/lib.git".to_string(),
            dest: "lib".to_string(),
            branch: None,
        };
        assert_eq!(clone.provides(workdir), vec![PathBuf::from("/opt/bench/lib")]);

        let install = Step::RunScript {
            script: "./install.sh".to_string(),
            args: vec![],
            workdir: Some("lib".to_string()),
        };
        let required = install.requires(workdir);
        assert!(required.contains(&PathBuf::from("/opt/bench/lib/./install.sh")));
        assert!(required.contains(&PathBuf::from("/opt/bench/lib")));
    }

    #[test]
    fn test_commands() {
        let workdir = Path::new("/opt/bench");
        let chmod = Step::Chmod {
            paths: vec!["evaluate.py".to_string()],
            mode: "755".to_string(),
        };
        assert_eq!(chmod.command(workdir, Path::new(".")).to_string(), "chmod 755 evaluate.py");

        let pip = Step::PipInstall {
            packages: vec!["tabpfn>=2.0".to_string()],
            editable: vec!["tabrepo".to_string()],
            extra_index_url: None,
        };
        assert_eq!(
            pip.command(workdir, Path::new(".")).to_string(),
            "python -m pip install --no-cache-dir 'tabpfn>=2.0' -e tabrepo"
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(parse_mode("755"), Some(0o755));
        assert_eq!(parse_mode("0o644"), Some(0o644));
        assert_eq!(parse_mode("899"), None);
        assert_eq!(parse_mode("17777"), None);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain/path.sh"), "plain/path.sh");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
