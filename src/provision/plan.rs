//! Ordered provisioning plan for the benchmark image

use super::step::Step;
use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_BASE_IMAGE: &str = "pytorch/pytorch:2.3.1-cuda12.1-cudnn8-runtime";
pub const DEFAULT_WORKDIR: &str = "/opt/benchmark";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionPlan {
    pub base_image: String,
    pub workdir: String,
    pub steps: Vec<Step>,
}

impl ProvisionPlan {
    /// Benchmark image: AutoGluon from source, local tabrepo checkout with
    /// optional model packages, generated configs, executable entry scripts.
    pub fn tabrepo() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            steps: vec![
                Step::Clone {
                    repo: "https://github.com/autogluon/autogluon.git".to_string(),
                    dest: "autogluon".to_string(),
                    branch: Some("master".to_string()),
                },
                Step::RunScript {
                    script: "./full_install.sh".to_string(),
                    args: vec![],
                    workdir: Some("autogluon".to_string()),
                },
                Step::Copy {
                    src: ".".to_string(),
                    dest: "tabrepo".to_string(),
                },
                Step::PipInstall {
                    packages: vec![
                        "tabpfn>=2.0".to_string(),
                        "tabicl".to_string(),
                        "pytabkit".to_string(),
                        "einops".to_string(),
                    ],
                    editable: vec!["tabrepo".to_string()],
                    extra_index_url: None,
                },
                Step::Generate {
                    script: "scripts/generate_configs.py".to_string(),
                    args: vec!["--output-dir".to_string(), "configs/generated".to_string()],
                    outputs: vec!["configs/generated".to_string()],
                    workdir: Some("tabrepo".to_string()),
                },
                Step::Chmod {
                    paths: vec![
                        "tabrepo/evaluate.py".to_string(),
                        "tabrepo/entrypoint.sh".to_string(),
                    ],
                    mode: "755".to_string(),
                },
            ],
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ProvisionError> {
        let plan: ProvisionPlan = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> Result<String, ProvisionError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn workdir_path(&self) -> PathBuf {
        PathBuf::from(&self.workdir)
    }

    /// Check that the plan is complete and every step only touches paths
    /// created by an earlier step. Paths outside the workdir belong to the
    /// base image and are not tracked.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.base_image.trim().is_empty() {
            return Err(ProvisionError::MissingBaseImage);
        }
        if self.steps.is_empty() {
            return Err(ProvisionError::NoSteps);
        }

        let workdir = normalize(&self.workdir_path());
        let mut provided: Vec<PathBuf> = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(reason) = step.incomplete() {
                return Err(ProvisionError::InvalidStep {
                    index,
                    kind: step.kind(),
                    reason,
                });
            }

            for path in step.requires(&workdir).iter().map(|p| normalize(p)) {
                let tracked = path.starts_with(&workdir) && path != workdir;
                let available = provided.iter().any(|p| path.starts_with(p));
                if tracked && !available {
                    return Err(ProvisionError::MissingPrerequisite {
                        index,
                        kind: step.kind(),
                        path: path.display().to_string(),
                    });
                }
            }

            provided.extend(step.provides(&workdir).iter().map(|p| normalize(p)));
        }

        Ok(())
    }

    /// Render the plan as a Dockerfile
    pub fn render_dockerfile(&self) -> String {
        let workdir = self.workdir_path();
        let mut lines = vec![
            format!("FROM {}", self.base_image),
            String::new(),
            format!("WORKDIR {}", self.workdir),
        ];
        for step in &self.steps {
            lines.push(step.dockerfile_instruction(&workdir));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Fold `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

impl Default for ProvisionPlan {
    fn default() -> Self {
        Self::tabrepo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_is_valid() {
        let plan = ProvisionPlan::tabrepo();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.steps.len(), 6);
    }

    #[test]
    fn test_install_before_clone_is_rejected() {
        let mut plan = ProvisionPlan::tabrepo();
        plan.steps.swap(0, 1);
        match plan.validate() {
            Err(ProvisionError::MissingPrerequisite { index, kind, .. }) => {
                assert_eq!(index, 0);
                assert_eq!(kind, "run_script");
            }
            other => panic!("expected missing prerequisite, got {:?}", other),
        }
    }

    #[test]
    fn test_chmod_before_copy_is_rejected() {
        let mut plan = ProvisionPlan::tabrepo();
        let chmod = plan.steps.pop().unwrap();
        plan.steps.insert(2, chmod);
        assert!(matches!(
            plan.validate(),
            Err(ProvisionError::MissingPrerequisite { index: 2, .. })
        ));
    }

    #[test]
    fn test_system_paths_are_untracked() {
        let plan = ProvisionPlan {
            base_image: "ubuntu:22.04".to_string(),
            workdir: "/work".to_string(),
            steps: vec![Step::RunScript {
                script: "/usr/local/bin/setup.sh".to_string(),
                args: vec![],
                workdir: None,
            }],
        };
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_parent_dir_escape_is_not_provided() {
        let plan = ProvisionPlan {
            base_image: "ubuntu:22.04".to_string(),
            workdir: "/work".to_string(),
            steps: vec![
                Step::Mkdir {
                    path: "tools".to_string(),
                },
                Step::RunScript {
                    script: "tools/../scripts/setup.sh".to_string(),
                    args: vec![],
                    workdir: None,
                },
            ],
        };
        match plan.validate() {
            Err(ProvisionError::MissingPrerequisite { index, path, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(path, "/work/scripts/setup.sh");
            }
            other => panic!("expected missing prerequisite, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/work/a/./b/../c")), PathBuf::from("/work/a/c"));
        assert_eq!(normalize(Path::new("/work/a/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_empty_plans_rejected() {
        let mut plan = ProvisionPlan::tabrepo();
        plan.base_image = " ".to_string();
        assert!(matches!(plan.validate(), Err(ProvisionError::MissingBaseImage)));

        let mut plan = ProvisionPlan::tabrepo();
        plan.steps.clear();
        assert!(matches!(plan.validate(), Err(ProvisionError::NoSteps)));
    }

    #[test]
    fn test_render_dockerfile() {
        let dockerfile = ProvisionPlan::tabrepo().render_dockerfile();
        let lines: Vec<&str> = dockerfile.lines().collect();
        assert_eq!(lines[0], format!("FROM {}", DEFAULT_BASE_IMAGE));
        assert!(dockerfile.contains("WORKDIR /opt/benchmark"));
        assert!(dockerfile.contains(
            "RUN git clone --branch master https://github.com/autogluon/autogluon.git autogluon"
        ));
        assert!(dockerfile.contains("RUN cd autogluon && bash ./full_install.sh"));
        assert!(dockerfile.contains("COPY . tabrepo"));
        assert!(dockerfile.contains("RUN chmod 755 tabrepo/evaluate.py tabrepo/entrypoint.sh"));

        let clone_at = dockerfile.find("git clone").unwrap();
        let install_at = dockerfile.find("full_install.sh").unwrap();
        assert!(clone_at < install_at);
    }

    #[test]
    fn test_yaml_round_trip() {
        let plan = ProvisionPlan::tabrepo();
        let yaml = plan.to_yaml_string().unwrap();
        assert!(yaml.contains("kind: pip_install"));
        assert_eq!(ProvisionPlan::from_yaml_str(&yaml).unwrap(), plan);
    }
}
