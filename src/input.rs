use std::{ io, fs, path::{Path, PathBuf}, };
use log::info;

use thiserror::Error;

use crate::state::State;
use crate::Target;



///
/// Errors which may occur when loading a listing. All of them are fatal.
///
#[derive(Error, Debug)]
pub enum InputError
{
        #[error("could not read {path:?}: {source}")]
        IoErr { path: PathBuf, #[source] source: io::Error },

        #[error("{0:?} is not a text listing (invalid UTF-8)")]
        NotText(PathBuf),

        #[error("no functions found in {0:?}; is this an avr-objdump -d listing?")]
        NoFunctions(PathBuf),
}



///
/// Containing the successfully loaded data.
///
#[derive(Clone, Debug)]
pub struct InputData
{
    pub lss_path:   PathBuf,
    pub text:       String,
}

///
/// Load the listing at `lss_fp`, as written by `avr-objdump -d` (or `-S`,
/// which interleaves the C source). Nothing is parsed yet.
///
pub fn load_listing(lss_fp: &Path) -> Result<InputData, InputError>
{
    let lss_path = lss_fp.to_path_buf();

    let bytes: Vec<u8> = fs::read(lss_fp).map_err(|source|
                        InputError::IoErr { path: lss_path.clone(), source })?;

    let text = String::from_utf8(bytes).map_err(|_|
                InputError::NotText(lss_path.clone()))?;

    info!("read {} bytes from {:?}", text.len(), lss_path);

    Ok( InputData { lss_path, text } )
}

///
/// `load_listing` followed by graph construction. A listing without a
/// single function is refused rather than reported as an empty tree.
///
pub fn analyse_file(lss_fp: &Path, target: Target) -> Result<State, InputError>
{
    let inp = load_listing(lss_fp)?;
    let state = State::from_listing(&inp.text, target);

    if state.g.node_count() == 0
    {
        return Err( InputError::NoFunctions(inp.lss_path) );
    }
    Ok(state)
}



#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_file_is_fatal()
    {
        let err = load_listing(Path::new("/definitely/not/here.lss")).unwrap_err();
        assert!(matches!(err, InputError::IoErr { .. }));
        assert!(err.to_string().contains("here.lss"));
    }

    #[test]
    fn binary_file_is_refused()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0x7f, b'E', b'L', b'F', 0xff, 0xfe]).unwrap();
        assert!(matches!(load_listing(f.path()), Err(InputError::NotText(_))));
    }

    #[test]
    fn listing_without_functions_is_refused()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "blink.elf:     file format elf32-avr").unwrap();
        assert!(matches!(analyse_file(f.path(), Target::Avr), Err(InputError::NoFunctions(_))));
    }

    #[test]
    fn reads_and_builds()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "00000100 <main>:\n     100:\tcf 93 \tpush\tr28\n").unwrap();
        let s = analyse_file(f.path(), Target::Avr).unwrap();
        assert_eq!(s.g.node_count(), 1);
    }
}
