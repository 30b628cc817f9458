//! Central error types for the OSIS importer.
//!
//! Jede fatale Bedingung ist eine eigene Variante. Die Library ruft niemals
//! `exit()` auf — alle Fehler wandern als `Result` zum CLI-Treiber, der über
//! [`Error::exit_code`] den Prozess-Exit-Code wählt.

use core::fmt;

/// All fatal conditions the importer can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid command line argument or option combination.
    Usage(String),
    /// The module exists but cannot be written to.
    NotWritable(String),
    /// The module could not be created on disk.
    ModuleCreate(String),
    /// The OSIS input could not be opened for reading.
    InputOpen(String),
    /// BSP/BCV nesting is broken beyond recovery (end tag without any
    /// open container, or a milestone mismatch under strict nesting).
    BadNesting(String),
    /// The comment automaton reached a state it cannot reach on any input.
    BadComment(String),
    /// The entity automaton reached a state it cannot reach on any input.
    BadEntity(String),
    /// An I/O failure while writing entries or flushing the module.
    Io(String),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// 1 Usage, 2 nicht beschreibbar, 3 Anlegen fehlgeschlagen, 4 Eingabe
    /// nicht lesbar, 5 BSP/BCV-Nesting, 6 Kommentar-Automat, 7 Entity-Automat.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 1,
            Self::NotWritable(_) | Self::Io(_) => 2,
            Self::ModuleCreate(_) => 3,
            Self::InputOpen(_) => 4,
            Self::BadNesting(_) => 5,
            Self::BadComment(_) => 6,
            Self::BadEntity(_) => 7,
        }
    }

    /// Erstellt einen `Usage`-Fehler aus beliebigem Display-Material.
    pub fn usage(msg: impl fmt::Display) -> Self {
        Self::Usage(msg.to_string())
    }

    /// Erstellt einen `Io`-Fehler mit Kontext.
    pub fn io(context: &str, e: std::io::Error) -> Self {
        Self::Io(format!("{context}: {e}"))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) => write!(f, "{msg}"),
            Self::NotWritable(path) => {
                write!(f, "module is not writable: {path}")
            }
            Self::ModuleCreate(msg) => write!(f, "couldn't create module: {msg}"),
            Self::InputOpen(msg) => write!(f, "couldn't open input: {msg}"),
            Self::BadNesting(msg) => write!(f, "bad BSP/BCV nesting: {msg}"),
            Self::BadComment(msg) => write!(f, "bad XML comment: {msg}"),
            Self::BadEntity(msg) => write!(f, "bad XML entity: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
