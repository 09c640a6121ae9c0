//! External tool catalog
//!
//! Detection commands for every tool the workflows drive, and install
//! recipes per host package manager for `setup bootstrap`.

use std::fmt;

use crate::engine::command::CommandSpec;
use crate::engine::prerequisites::ToolRequirement;

pub fn docker() -> ToolRequirement {
    ToolRequirement::new("docker", ["--version"])
}

pub fn kubectl() -> ToolRequirement {
    ToolRequirement::new("kubectl", ["version", "--client"])
}

pub fn minikube() -> ToolRequirement {
    ToolRequirement::new("minikube", ["version"])
}

pub fn terraform() -> ToolRequirement {
    ToolRequirement::new("terraform", ["version"]).min_version("1.0.0")
}

pub fn aws() -> ToolRequirement {
    ToolRequirement::new("aws", ["--version"]).min_version("2.0.0")
}

pub fn python3() -> ToolRequirement {
    ToolRequirement::new("python3", ["--version"]).min_version("3.8")
}

/// `ssh-keygen` has no version flag; the OpenSSH client reports it
pub fn ssh_keygen() -> ToolRequirement {
    ToolRequirement {
        name: "ssh-keygen".to_string(),
        detect: CommandSpec::new("ssh").arg("-V"),
        min_version: None,
    }
}

/// Everything `setup prereq` checks
pub fn all() -> Vec<ToolRequirement> {
    vec![
        docker(),
        kubectl(),
        minikube(),
        terraform(),
        aws(),
        python3(),
        ssh_keygen(),
    ]
}

/// Host package managers `setup bootstrap` knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Brew,
    Apt,
    Winget,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Brew => write!(f, "brew"),
            PackageManager::Apt => write!(f, "apt-get"),
            PackageManager::Winget => write!(f, "winget"),
        }
    }
}

impl PackageManager {
    /// Package manager conventionally available on this OS
    pub fn for_host() -> Option<Self> {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: &str) -> Option<Self> {
        match os {
            "macos" => Some(PackageManager::Brew),
            "linux" => Some(PackageManager::Apt),
            "windows" => Some(PackageManager::Winget),
            _ => None,
        }
    }

    /// Command that installs `tool`, if there is a packaged version
    pub fn install_command(&self, tool: &str) -> Option<CommandSpec> {
        match self {
            PackageManager::Brew => {
                let args: &[&str] = match tool {
                    "docker" => &["install", "--cask", "docker"],
                    "kubectl" => &["install", "kubectl"],
                    "minikube" => &["install", "minikube"],
                    "terraform" => &["install", "hashicorp/tap/terraform"],
                    "aws" => &["install", "awscli"],
                    "python3" => &["install", "python@3"],
                    "ssh-keygen" => &["install", "openssh"],
                    _ => return None,
                };
                Some(CommandSpec::new("brew").args(args.iter().copied()))
            }
            PackageManager::Apt => match tool {
                "docker" => Some(apt("docker.io")),
                "python3" => Some(apt("python3-venv")),
                "ssh-keygen" => Some(apt("openssh-client")),
                "aws" => Some(snap("aws-cli")),
                "kubectl" => Some(snap("kubectl")),
                "terraform" => Some(snap("terraform")),
                _ => None,
            },
            PackageManager::Winget => {
                let id = match tool {
                    "docker" => "Docker.DockerDesktop",
                    "kubectl" => "Kubernetes.kubectl",
                    "minikube" => "Kubernetes.minikube",
                    "terraform" => "Hashicorp.Terraform",
                    "aws" => "Amazon.AWSCLI",
                    "python3" => "Python.Python.3.12",
                    "ssh-keygen" => "Microsoft.OpenSSH.Preview",
                    _ => return None,
                };
                Some(CommandSpec::new("winget").args(["install", "-e", "--id", id]))
            }
        }
    }
}

fn apt(package: &str) -> CommandSpec {
    CommandSpec::new("sudo").args(["apt-get", "install", "-y", package])
}

fn snap(package: &str) -> CommandSpec {
    CommandSpec::new("sudo").args(["snap", "install", package, "--classic"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_os() {
        assert_eq!(PackageManager::for_os("macos"), Some(PackageManager::Brew));
        assert_eq!(PackageManager::for_os("linux"), Some(PackageManager::Apt));
        assert_eq!(PackageManager::for_os("freebsd"), None);
    }

    #[test]
    fn test_install_commands() {
        let cmd = PackageManager::Apt.install_command("docker").unwrap();
        assert_eq!(cmd.to_string(), "sudo apt-get install -y docker.io");

        let cmd = PackageManager::Brew.install_command("terraform").unwrap();
        assert_eq!(cmd.to_string(), "brew install hashicorp/tap/terraform");

        // minikube ships as a standalone binary on Debian-based hosts
        assert!(PackageManager::Apt.install_command("minikube").is_none());
        assert!(PackageManager::Winget.install_command("unknown").is_none());
    }

    #[test]
    fn test_every_tool_has_a_detection_command() {
        for tool in all() {
            assert!(!tool.detect.program.is_empty(), "{}", tool.name);
        }
    }
}
