use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn inflate_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".inflate");
    PathBuf::from(o)
}

/// Replace a gzip file with its decompressed contents.
///
/// Output goes to a sibling file first and is renamed over `path` only when the
/// whole stream decoded, so a failure leaves the compressed file untouched.
pub fn gunzip_in_place(path: &Path) -> io::Result<u64> {
    let out_path = inflate_path(path);
    let result = (|| -> io::Result<u64> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        let mut out = BufWriter::new(File::create(&out_path)?);
        let n = io::copy(&mut decoder, &mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(n)
    })();
    match result {
        Ok(n) => {
            fs::rename(&out_path, path)?;
            tracing::debug!(path = %path.display(), bytes = n, "asset decompressed");
            Ok(n)
        }
        Err(e) => {
            let _ = fs::remove_file(&out_path);
            Err(e)
        }
    }
}
