//! Default pattern tables for the policy engine.
//!
//! The tables are plain data so deployments can replace or extend them
//! before handing them to [`PolicyEngine::new`](crate::PolicyEngine::new).
//! All regexes compile case-insensitively.

/// A named regex source for deny/argument matching.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub name: String,
    pub pattern: String,
}

/// A named regex source plus the fixed token that replaces its matches.
#[derive(Debug, Clone)]
pub struct SecretPatternSpec {
    pub name: String,
    pub pattern: String,
    pub replacement: String,
}

fn spec(name: &str, pattern: &str) -> PatternSpec {
    PatternSpec {
        name: name.to_string(),
        pattern: pattern.to_string(),
    }
}

fn secret(name: &str, pattern: &str, replacement: &str) -> SecretPatternSpec {
    SecretPatternSpec {
        name: name.to_string(),
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
    }
}

/// The full rule set consumed by the engine: three command tiers (each tier
/// is a delta over the previous one), per-level dangerous-pattern lists, the
/// always-denied list, per-command argument shapes, and the secret table.
#[derive(Debug, Clone)]
pub struct PolicyRules {
    pub low_commands: Vec<String>,
    pub medium_commands: Vec<String>,
    pub high_commands: Vec<String>,
    pub always_denied: Vec<PatternSpec>,
    pub low_patterns: Vec<PatternSpec>,
    pub medium_patterns: Vec<PatternSpec>,
    pub high_patterns: Vec<PatternSpec>,
    pub argument_patterns: Vec<(String, Vec<PatternSpec>)>,
    pub secret_patterns: Vec<SecretPatternSpec>,
}

const LOW_COMMANDS: &[&str] = &[
    // Read-only file operations
    "ls", "cat", "head", "tail", "grep", "find", "du", "df", "file", "stat",
    // System info
    "uname", "whoami", "id", "pwd", "date", "uptime", "free", "lscpu",
    "ps", "top", "htop", "pgrep", "pidof",
    // Network info
    "ping", "curl", "wget", "netstat", "ss", "dig", "nslookup",
    "ip", "route", "arp", "ifconfig",
    // Text processing
    "awk", "sed", "sort", "uniq", "wc", "cut", "tr", "echo", "printf",
    // Utilities
    "which", "whereis", "type", "hash", "env", "export", "unset",
    "history", "cd",
];

const MEDIUM_COMMANDS: &[&str] = &[
    // File operations including writes
    "nano", "vim", "vi", "tee", "cp", "mv", "rm", "rmdir", "mkdir", "touch",
    "chmod", "chown", "ln", "chattr", "lsattr",
    // Service administration
    "kill", "killall", "pkill", "nohup", "systemctl", "journalctl", "service",
    // Kubernetes and container tooling
    "kubectl", "helm", "k3s", "crictl", "ctr",
    "docker", "docker-compose", "podman", "buildah",
    // Archives
    "tar", "gzip", "gunzip", "zip", "unzip", "bzip2", "xz",
    // Version control
    "git",
    // Network tunnels and remote shells
    "ssh", "scp", "rsync", "tailscale", "cloudflared",
    // Package management
    "apt", "apt-get", "dpkg", "snap", "yum", "dnf", "pacman",
    // Monitoring and debugging
    "strace", "ltrace", "gdb", "valgrind", "perf", "iotop", "iostat",
    // Hardware and kernel info
    "lshw", "lspci", "lsusb", "lsmod", "dmesg",
    // User management
    "useradd", "usermod", "userdel", "groupadd", "groupmod", "groupdel",
    "passwd", "chpasswd",
    // Security and certificates
    "openssl", "certbot", "ufw", "iptables", "firewall-cmd",
    "ssh-keygen", "ssh-add", "ssh-copy-id",
    // Filesystem tooling
    "mount", "umount", "fdisk", "parted", "mkfs", "fsck", "tune2fs",
    "sync", "swapon", "swapoff", "mkswap", "blkid", "lsblk",
    // Shells and multiplexers
    "bash", "sh", "zsh", "fish", "screen", "tmux",
    // Network tools
    "nc", "netcat", "telnet", "nmap", "traceroute", "mtr", "whois",
    "tcpdump",
    // Time and date
    "timedatectl", "ntpdate",
    // Shell builtins commonly issued through the gateway
    "alias", "unalias", "set", "readonly", "declare", "local", "exit",
    "source", "exec", "eval", "trap", "wait", "jobs", "fg", "bg",
    "pushd", "popd", "dirs",
];

const HIGH_COMMANDS: &[&str] = &[
    "sudo", "sudoedit",
    "reboot", "shutdown", "halt", "poweroff", "init",
    "modprobe",
];

// Destructive command forms no level admits.
const ALWAYS_DENIED: &[(&str, &str)] = &[
    ("rm_rf_root", r"^rm\s+-rf\s+/\s*$"),
    ("dd_disk_wipe", r"^dd\s+if=/dev/zero\s+of=/dev/sd[a-z]"),
    ("mkfs_destruction", r"^mkfs(\.\w+)?\s+/dev/sd[a-z]"),
    ("fdisk_destruction", r"^fdisk\s+/dev/sd[a-z]"),
];

const FS_DESTRUCTION: &[(&str, &str)] = &[
    ("rm_rf_root", r"rm\s+-rf\s+/"),
    ("dd_disk_wipe", r"dd\s+if=/dev/zero\s+of=/dev/sd[a-z]"),
    ("mkfs_destruction", r"mkfs\.\w+\s+/dev/sd[a-z]"),
    ("fdisk_destruction", r"fdisk\s+/dev/sd[a-z]"),
];

// High only blocks the destructive forms when they are the entire trailing
// expression.
const FS_DESTRUCTION_ANCHORED: &[(&str, &str)] = &[
    ("rm_rf_root", r"rm\s+-rf\s+/$"),
    ("dd_disk_wipe", r"dd\s+if=/dev/zero\s+of=/dev/sd[a-z]$"),
    ("mkfs_destruction", r"mkfs\.\w+\s+/dev/sd[a-z]$"),
    ("fdisk_destruction", r"fdisk\s+/dev/sd[a-z]$"),
];

const COMMAND_CHAINING: (&str, &str) = (
    "command_chaining",
    r"&&|\|\||;|\||`|\$\(|>|>>|<|\*|\?|\[|\]",
);

const SUDO_USAGE: (&str, &str) = ("sudo_usage", r"\bsudo\b");

impl Default for PolicyRules {
    fn default() -> Self {
        let mut low_patterns = vec![
            spec(COMMAND_CHAINING.0, COMMAND_CHAINING.1),
            spec(SUDO_USAGE.0, SUDO_USAGE.1),
        ];
        low_patterns.extend(FS_DESTRUCTION.iter().map(|(n, p)| spec(n, p)));

        Self {
            low_commands: LOW_COMMANDS.iter().map(|s| s.to_string()).collect(),
            medium_commands: MEDIUM_COMMANDS.iter().map(|s| s.to_string()).collect(),
            high_commands: HIGH_COMMANDS.iter().map(|s| s.to_string()).collect(),
            always_denied: ALWAYS_DENIED.iter().map(|(n, p)| spec(n, p)).collect(),
            low_patterns,
            medium_patterns: FS_DESTRUCTION.iter().map(|(n, p)| spec(n, p)).collect(),
            high_patterns: FS_DESTRUCTION_ANCHORED
                .iter()
                .map(|(n, p)| spec(n, p))
                .collect(),
            argument_patterns: default_argument_patterns(),
            secret_patterns: default_secret_patterns(),
        }
    }
}

/// Argument shapes for tools whose subcommand surface is too broad to allow
/// wholesale. The argument tail must match at least one shape.
fn default_argument_patterns() -> Vec<(String, Vec<PatternSpec>)> {
    vec![
        (
            "kubectl".to_string(),
            vec![
                spec(
                    "kubectl_get",
                    r"^get\s+(pods?|services?|deployments?|nodes?|namespaces?)(\s+\S+)*(\s+-[a-zA-Z]+(\s+\S+)*)*$",
                ),
                spec(
                    "kubectl_describe",
                    r"^describe\s+(pods?|services?|deployments?|nodes?)(\s+\S+)*(\s+-[a-zA-Z]+(\s+\S+)*)*$",
                ),
                spec("kubectl_logs", r"^logs\s+\S+(\s+-[a-zA-Z]+(\s+\S+)*)*$"),
                spec("kubectl_top", r"^top\s+(pods?|nodes?)(\s+-[a-zA-Z]+(\s+\S+)*)*$"),
                spec("kubectl_config", r"^config\s+view(\s+--minify)?$"),
            ],
        ),
        (
            "systemctl".to_string(),
            vec![
                spec("systemctl_status", r"^status\s+\S+$"),
                spec("systemctl_is_active", r"^is-active\s+\S+$"),
                spec("systemctl_is_enabled", r"^is-enabled\s+\S+$"),
                spec(
                    "systemctl_list_units",
                    r"^list-units(\s+--type=\w+)?(\s+--state=\w+)?$",
                ),
            ],
        ),
        (
            "journalctl".to_string(),
            vec![
                spec(
                    "journalctl_since",
                    r#"^--since\s+"[^"]*"(\s+--unit=\S+)?(\s+-n\s+\d+)?$"#,
                ),
                spec(
                    "journalctl_unit",
                    r#"^--unit=\S+(\s+--since\s+"[^"]*")?(\s+-n\s+\d+)?$"#,
                ),
                spec("journalctl_lines", r"^-n\s+\d+(\s+--unit=\S+)?$"),
            ],
        ),
        (
            "docker".to_string(),
            vec![
                spec("docker_ps", r"^ps(\s+-[a-zA-Z]+)*$"),
                spec("docker_images", r"^images(\s+-[a-zA-Z]+)*$"),
                spec("docker_logs", r"^logs\s+\S+(\s+-[a-zA-Z]+(\s+\S+)*)*$"),
                spec("docker_inspect", r"^inspect\s+\S+$"),
                spec("docker_stats", r"^stats(\s+\S+)*$"),
            ],
        ),
        (
            "git".to_string(),
            vec![
                spec("git_status", r"^status$"),
                spec("git_log", r"^log(\s+--oneline)?(\s+-n\s+\d+)?$"),
                spec("git_branch", r"^branch(\s+-[a-zA-Z]+)*$"),
                spec("git_diff", r"^diff(\s+\S+)*$"),
                spec("git_show", r"^show(\s+\S+)*$"),
            ],
        ),
    ]
}

/// Credential shapes replaced in captured output. Specific shapes come
/// before the generic base64 catch-all so their labels win.
fn default_secret_patterns() -> Vec<SecretPatternSpec> {
    vec![
        secret("openai_key", r"sk-[A-Za-z0-9]{48}", "[REDACTED_API_KEY]"),
        secret("github_token", r"ghp_[A-Za-z0-9]{36}", "[REDACTED_GITHUB_TOKEN]"),
        secret(
            "gitlab_token",
            r"glpat-[A-Za-z0-9_\-]{20}",
            "[REDACTED_GITLAB_TOKEN]",
        ),
        secret(
            "slack_token",
            r"xox[baprs]-[A-Za-z0-9\-]{10,48}",
            "[REDACTED_SLACK_TOKEN]",
        ),
        secret("aws_key", r"AKIA[0-9A-Z]{16}", "[REDACTED_AWS_KEY]"),
        secret(
            "private_key",
            r"(?s)-----BEGIN [A-Z ]+-----.*?-----END [A-Z ]+-----",
            "[REDACTED_PRIVATE_KEY]",
        ),
        secret("base64_token", r"[A-Za-z0-9+/]{40,}={0,2}", "[REDACTED_TOKEN]"),
    ]
}
