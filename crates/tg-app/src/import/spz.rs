use std::ffi::{c_char, c_int, CStr};
use std::path::{Path, PathBuf};
use std::ptr;
use libloading::{Library, Symbol};
use tracing::{debug, info};
use crate::error::DecodeError;
use super::Decoder;

const LIBRARY_NAME: &str = "spz_shared";

const DECOMPRESS: &[u8] = b"decompress_spz";
const ERROR_STRING: &[u8] = b"get_error_string_spz";
const FREE_BUFFER: &[u8] = b"free_buffer_spz";

/// `int decompress_spz(const uint8_t *input, int input_size, int include_normals, uint8_t **output, int *output_size)`
type DecompressFn = unsafe extern "C" fn(*const u8, c_int, c_int, *mut *mut u8, *mut c_int) -> c_int;
type ErrorStringFn = unsafe extern "C" fn(c_int) -> *const c_char;
type FreeBufferFn = unsafe extern "C" fn(*mut u8);

/// Decompresses SPZ results into PLY through the native `spz_shared` library
pub struct SpzDecoder {
    library: Library,
    path: PathBuf,
}

impl SpzDecoder {
    /// Loads the library from `location`, which may be the library file or a
    /// directory holding it. Without a location the system search path is used.
    pub fn load(location: Option<&Path>) -> Result<Self, DecodeError> {
        let path = resolve(location)?;

        // SAFETY: loading runs the library's initializers; `spz_shared` has no
        // initialization side effects beyond its own statics.
        let library = unsafe { Library::new(&path) }
            .map_err(|e| DecodeError(format!("cannot load SPZ library {}: {e}", path.display())))?;

        let decoder = Self { library, path };
        // SAFETY: only checks that the symbols exist; nothing is called.
        unsafe {
            decoder.symbol::<DecompressFn>(DECOMPRESS)?;
            decoder.symbol::<ErrorStringFn>(ERROR_STRING)?;
            decoder.symbol::<FreeBufferFn>(FREE_BUFFER)?;
        }

        info!("Loaded SPZ library from {}", decoder.path.display());
        Ok(decoder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SAFETY: `T` must match the C signature of `name`.
    unsafe fn symbol<T>(&self, name: &[u8]) -> Result<Symbol<'_, T>, DecodeError> {
        unsafe { self.library.get(name) }.map_err(|e| {
            DecodeError(format!(
                "SPZ library {} has no `{}`: {e}",
                self.path.display(),
                String::from_utf8_lossy(name)
            ))
        })
    }

    fn error_message(&self, code: c_int) -> String {
        // SAFETY: `get_error_string_spz` returns a static NUL-terminated string or null.
        unsafe {
            let Ok(error_string) = self.symbol::<ErrorStringFn>(ERROR_STRING) else {
                return format!("unknown error ({code})");
            };
            let message = error_string(code);
            if message.is_null() {
                format!("unknown error ({code})")
            } else {
                CStr::from_ptr(message).to_string_lossy().into_owned()
            }
        }
    }
}

impl Decoder for SpzDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let size = c_int::try_from(payload.len())
            .map_err(|_| DecodeError(format!("payload of {} bytes is too large for SPZ", payload.len())))?;

        let mut output: *mut u8 = ptr::null_mut();
        let mut output_size: c_int = 0;

        // SAFETY: the signatures match the library header. `payload` outlives the
        // call, and `output` belongs to the library until passed to `free_buffer_spz`.
        unsafe {
            let decompress = self.symbol::<DecompressFn>(DECOMPRESS)?;
            let free_buffer = self.symbol::<FreeBufferFn>(FREE_BUFFER)?;

            let code = decompress(payload.as_ptr(), size, 0, &mut output, &mut output_size);
            if code != 0 {
                if !output.is_null() {
                    free_buffer(output);
                }
                return Err(DecodeError(format!(
                    "SPZ decompression failed ({code}): {}",
                    self.error_message(code)
                )));
            }

            if output.is_null() {
                return Err(DecodeError("SPZ library returned no data".into()));
            }
            let ply = match usize::try_from(output_size) {
                Ok(len) if len > 0 => std::slice::from_raw_parts(output, len).to_vec(),
                _ => Vec::new(),
            };
            free_buffer(output);

            if ply.is_empty() {
                return Err(DecodeError("SPZ library returned no data".into()));
            }

            debug!("Decompressed {} SPZ bytes into {} PLY bytes", payload.len(), ply.len());
            Ok(ply)
        }
    }
}

/// Platform file name of the library, e.g. `libspz_shared.so`
fn library_file_name() -> PathBuf {
    PathBuf::from(libloading::library_filename(LIBRARY_NAME))
}

fn resolve(location: Option<&Path>) -> Result<PathBuf, DecodeError> {
    match location {
        Some(dir) if dir.is_dir() => {
            let candidate = dir.join(library_file_name());
            if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(DecodeError(format!(
                    "could not find {} in {}",
                    library_file_name().display(),
                    dir.display()
                )))
            }
        }
        Some(file) if file.exists() => Ok(file.to_path_buf()),
        Some(missing) => Err(DecodeError(format!(
            "SPZ library path does not exist: {}",
            missing.display()
        ))),
        None => Ok(library_file_name()),
    }
}
