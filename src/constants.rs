//! Global Constants
//!
//! Centralized constants for traversal, extraction heuristics, agents and tracing.
//! All magic numbers and fixed keyword tables live here.

/// Output schema constants
pub mod schema {
    /// Version stamped into every fingerprint, agent report and trace record
    pub const SCHEMA_VERSION: u32 = 1;

    /// Agent name used for the merged report
    pub const COORDINATOR_NAME: &str = "Coordinator";

    /// Width of the `=` rules in text output
    pub const RULE_WIDTH: usize = 80;
}

/// Repository traversal constants
pub mod traversal {
    /// Directories skipped by exact name (the whole subtree is pruned)
    pub const IGNORE_DIRS: &[&str] = &[
        ".git",
        "__pycache__",
        ".pytest_cache",
        "node_modules",
        ".venv",
        "venv",
        "env",
        ".mypy_cache",
        ".ruff_cache",
    ];

    /// Files skipped by exact name
    pub const IGNORE_FILES: &[&str] = &[".gitignore", ".gitattributes", ".DS_Store"];

    /// Extensions (without the dot) the fingerprinter processes
    pub const SUPPORTED_EXTENSIONS: &[&str] = &["py"];

    /// Default maximum size of a processed source file (4 MiB)
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;
}

/// Static extraction heuristics
pub mod extraction {
    /// Top-level module names treated as the Python standard library
    pub const STDLIB_MODULES: &[&str] = &[
        "os",
        "sys",
        "json",
        "csv",
        "datetime",
        "time",
        "math",
        "random",
        "collections",
        "itertools",
        "functools",
        "operator",
        "pathlib",
        "typing",
        "dataclasses",
        "enum",
        "abc",
        "contextlib",
        "logging",
        "re",
        "string",
        "struct",
        "hashlib",
        "base64",
        "urllib",
        "http",
        "socket",
        "ssl",
        "subprocess",
        "multiprocessing",
        "threading",
        "asyncio",
        "concurrent",
        "queue",
        "select",
        "signal",
        "tempfile",
        "shutil",
        "glob",
        "fnmatch",
        "io",
        "pickle",
        "copy",
        "weakref",
        "warnings",
        "traceback",
        "inspect",
        "importlib",
        "pkgutil",
        "unittest",
        "doctest",
    ];

    pub const FILE_OPERATION_CALLS: &[&str] =
        &["open", "read", "write", "remove", "delete", "unlink"];

    pub const NETWORK_CALLS: &[&str] =
        &["socket", "request", "http", "urllib", "connect", "urlopen"];

    pub const PROCESS_CALLS: &[&str] =
        &["exec", "eval", "compile", "run", "popen", "call", "system"];

    pub const CRYPTO_CALLS: &[&str] = &[
        "crypto", "hash", "encrypt", "decrypt", "sign", "hmac", "sha", "md5",
    ];

    pub const DESERIALIZATION_CALLS: &[&str] =
        &["pickle", "marshal", "yaml.load", "json.loads", "loads"];

    pub const DYNAMIC_EXECUTION_CALLS: &[&str] = &["eval", "exec", "__import__"];

    pub const REFLECTION_CALLS: &[&str] = &[
        "getattr",
        "setattr",
        "hasattr",
        "__getattribute__",
        "getattribute",
    ];

    pub const CONFIGURATION_CALLS: &[&str] = &["config", "settings", "env", "getenv", "environ"];

    /// Base-class name fragments that mark a class as a deserialization surface
    pub const DESERIALIZING_BASE_MARKERS: &[&str] = &["pickle", "serialize"];

    /// Decorator fragment that marks a function as a deserialization surface
    pub const DESERIALIZING_DECORATOR_MARKER: &str = "pickle";
}

/// Agent thresholds
pub mod agents {
    /// Functions longer than this many lines are reported
    pub const LARGE_FUNCTION_LINES: u32 = 100;

    /// Classes declaring more than this many methods are reported
    pub const LARGE_CLASS_METHODS: usize = 20;

    /// Functions with more than this many parameters are reported
    pub const MANY_PARAMETERS: usize = 7;
}

/// Execution tracer constants
pub mod tracer {
    /// Default wall-clock timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

    /// Default bound on captured stdout/stderr (bytes, per stream)
    pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

    /// Interpreter used to run traced scripts
    pub const DEFAULT_INTERPRETER: &str = "python3";

    /// Marker prefix of instrumentation lines
    pub const TRACE_MARKER: &str = "SCR_TRACE:";

    /// Sandbox policy environment variables
    pub const ENV_NO_NETWORK: &str = "SCR_NO_NETWORK";
    pub const ENV_NO_FILE_WRITE: &str = "SCR_NO_FILE_WRITE";
    pub const ENV_TRACE_MODE: &str = "SCR_TRACE_MODE";

    /// Exit code recorded when the child timed out or could not run
    pub const SENTINEL_EXIT_CODE: i32 = -1;

    /// Upper bound of the risk score
    pub const MAX_RISK_SCORE: f64 = 100.0;

    /// How long to wait for pipe readers after the child was killed (milliseconds)
    pub const READER_GRACE_MS: u64 = 500;

    /// Fraction of the timeout after which a run counts as "near timeout"
    pub const NEAR_TIMEOUT_RATIO: f64 = 0.9;

    /// Characters of stdout/stderr shown in text reports
    pub const TEXT_PREVIEW_CHARS: usize = 500;
}
