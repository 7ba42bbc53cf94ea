// src/constants.rs

/// Config files searched (in order) in the working directory when no `--config` is given.
pub const PROJECT_CONFIG_FILENAMES: &[&str] = &["rivet.toml", "rivet.json"];

/// Directory created inside a compile action's output directory for rivet bookkeeping.
pub const STATE_DIR: &str = ".rivet";

/// The dependency cache written inside `STATE_DIR`.
pub const DEPENDENCY_CACHE_FILENAME: &str = "dependencies.json.gz";

/// Schema version of the dependency cache. Bump when the format changes.
pub const DEPENDENCY_CACHE_VERSION: u32 = 1;

/// Name of the blob cache directory under the user's cache directory.
pub const BLOB_CACHE_DIRNAME: &str = "rivet";

/// Attribute keys understood by the built-in action handlers.
pub mod keys {
    pub const ENV: &str = "env";
    pub const CWD: &str = "cwd";

    pub const SOURCE_PATHS: &str = "sourcePaths";
    pub const OUTPUT_PATH: &str = "outputPath";
    pub const COMPILER: &str = "compiler";
    pub const COMPILER_ARGS: &str = "compilerArgs";
    pub const INCLUDE_PATHS: &str = "includePaths";
    pub const INCLUDE_PATH_PREFIX: &str = "includePathPrefix";
    pub const DEFINES: &str = "defines";
    pub const COMPILE_FLAG: &str = "compileFlag";
    pub const OUTPUT_FLAG: &str = "outputFlag";
    pub const OBJECT_EXTENSION: &str = "objectExtension";
    pub const DEPENDENCY_DISCOVERY: &str = "dependencyDiscovery";
    pub const DEPENDENCY_FLAG: &str = "dependencyFlag";
    pub const INCLUDE_PATTERNS: &str = "includePatterns";
    pub const IMPORT_PATTERNS: &str = "importPatterns";
    pub const IMPORT_EXTENSIONS: &str = "importExtensions";
    pub const REBUILD_PATHS: &str = "rebuildPaths";
    pub const INCREMENTAL: &str = "incremental";
    pub const PARALLEL: &str = "parallel";

    pub const OBJECT_PATHS: &str = "objectPaths";
    pub const LINKER: &str = "linker";
    pub const LINKER_ARGS: &str = "linkerArgs";
    pub const LIBRARY_PATHS: &str = "libraryPaths";
    pub const LIBRARY_PATH_PREFIX: &str = "libraryPathPrefix";
    pub const LIBRARIES: &str = "libraries";
    pub const LIBRARY_PREFIX: &str = "libraryPrefix";

    pub const COMMAND: &str = "command";
    pub const TIMEOUT: &str = "timeout";

    pub const MAKE: &str = "make";
    pub const DIRECTORY: &str = "directory";
    pub const MAKE_ARGS: &str = "makeArgs";

    pub const URL: &str = "url";
    pub const CACHE: &str = "cache";
    pub const RETRIES: &str = "retries";

    pub const ARCHIVE_PATH: &str = "archivePath";
    pub const PATHS: &str = "paths";
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const EXISTS: &str = "exists";
    pub const NOT_EXISTS: &str = "notExists";

    pub const REQUIREMENTS: &str = "requirements";
}

/// Defaults applied when an attribute is not defined at any level.
pub mod defaults {
    pub const INCLUDE_PATH_PREFIX: &str = "-I";
    pub const LIBRARY_PATH_PREFIX: &str = "-L";
    pub const LIBRARY_PREFIX: &str = "-l";
    pub const COMPILE_FLAG: &str = "-c";
    pub const OUTPUT_FLAG: &str = "-o";
    pub const OBJECT_EXTENSION: &str = ".o";
    pub const DEPENDENCY_FLAG: &str = "-MM";
    pub const MAKE: &str = "make";
    pub const FETCH_PROGRAM: &str = "curl";
}
