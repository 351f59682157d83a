// hex image loading and end-of-run dump files

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::Cache;
use crate::commons::NUM_LINES;
use crate::core::Core;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },
    #[error("{path}:{line}: not a hex word: {word:?}")]
    Parse {
        path: PathBuf,
        line: usize,
        word: String,
    },
}

/// Load a whitespace-trimmed hex-word-per-line image. A missing file is
/// not an error: an absent input image simply means all zeros.
pub fn load_hex_image(path: &Path) -> Result<Option<Vec<u32>>, FileError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(FileError::Open {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut words = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| FileError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        let word = u32::from_str_radix(token, 16).map_err(|_| FileError::Parse {
            path: path.to_path_buf(),
            line: n + 1,
            word: token.to_string(),
        })?;
        words.push(word);
    }
    Ok(Some(words))
}

fn writer(path: &Path) -> Result<BufWriter<File>, FileError> {
    let file = File::create(path).map_err(|e| FileError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

pub fn create_writer(path: &Path) -> Result<BufWriter<File>, FileError> {
    writer(path)
}

fn wrap_write(path: &Path, r: io::Result<()>) -> Result<(), FileError> {
    r.map_err(|e| FileError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// One `%08X` word per line.
pub fn save_hex_image(path: &Path, words: &[u32]) -> Result<(), FileError> {
    let mut out = writer(path)?;
    wrap_write(path, (|| {
        for word in words {
            writeln!(out, "{:08X}", word)?;
        }
        out.flush()
    })())
}

/// R2 through R15, one word per line.
pub fn save_registers(path: &Path, core: &Core) -> Result<(), FileError> {
    let regs: Vec<u32> = (2..16).map(|r| core.register(r)).collect();
    save_hex_image(path, &regs)
}

pub fn save_dsram(path: &Path, cache: &Cache) -> Result<(), FileError> {
    save_hex_image(path, cache.dsram())
}

/// Tag store entries packed as `(state << 12) | tag`.
pub fn save_tsram(path: &Path, cache: &Cache) -> Result<(), FileError> {
    let lines: Vec<u32> = (0..NUM_LINES).map(|i| cache.line_dump(i)).collect();
    save_hex_image(path, &lines)
}

pub fn save_stats(path: &Path, core: &Core) -> Result<(), FileError> {
    let mut out = writer(path)?;
    wrap_write(path, (|| {
        writeln!(out, "cycles {}", core.stats.cycles)?;
        writeln!(out, "instructions {}", core.stats.instructions)?;
        writeln!(out, "read_hit {}", core.cache.stats.read_hit)?;
        writeln!(out, "write_hit {}", core.cache.stats.write_hit)?;
        writeln!(out, "read_miss {}", core.cache.stats.read_miss)?;
        writeln!(out, "write_miss {}", core.cache.stats.write_miss)?;
        writeln!(out, "decode_stall {}", core.stats.decode_stalls)?;
        writeln!(out, "mem_stall {}", core.stats.mem_stalls)?;
        out.flush()
    })())
}
