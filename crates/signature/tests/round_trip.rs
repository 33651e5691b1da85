//! End-to-end signature/delta/patch round trip against real files, exercised
//! the way `engine::DestFile`/`SourceFile` drive this crate: one chunk at a
//! time through the lazy iterators, never a single blocking pass.

use std::fs;
use std::io::Write as _;

use signature::{LoadSignature, PatchFile, delta_for_file, signature_of_file};

fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(contents).unwrap();
    path
}

fn load_signature_via_chunks(path: &std::path::Path) -> signature::Signature {
    let mut loader = LoadSignature::new();
    for chunk in signature_of_file(path).unwrap() {
        loader.add_chunk(&chunk.unwrap());
    }
    loader.commit().unwrap();
    loader.signature().unwrap().clone()
}

#[test]
fn patches_an_updated_file_to_match_new_content() {
    let dir = tempfile::tempdir().unwrap();
    let old_content = b"the quick brown fox jumps over the lazy dog\n".repeat(200);
    let old_path = write_temp(&dir, "old.bin", &old_content);

    // new_content: same prefix and suffix, a chunk spliced in the middle.
    let mut new_content = old_content[..5000].to_vec();
    new_content.extend_from_slice(b"SPLICED IN CONTENT THAT DOES NOT MATCH ANY BLOCK");
    new_content.extend_from_slice(&old_content[5000..]);
    let new_path = write_temp(&dir, "new.bin", &new_content);

    let signature = load_signature_via_chunks(&old_path);

    let mut patch = PatchFile::new(&old_path, signature.block_size).unwrap();
    for chunk in delta_for_file(&new_path, &signature).unwrap() {
        patch.apply_delta_chunk(&chunk.unwrap()).unwrap();
    }
    patch.commit().unwrap();

    let patched = fs::read(&old_path).unwrap();
    assert_eq!(patched, new_content);
}

#[test]
fn empty_file_produces_an_empty_signature() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "empty.bin", b"");
    let signature = load_signature_via_chunks(&path);
    assert!(signature.is_empty());
    assert_eq!(signature.file_len, 0);
}

#[test]
fn identical_content_produces_an_empty_delta() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"nothing changed here".repeat(50);
    let old_path = write_temp(&dir, "old.bin", &content);
    let new_path = write_temp(&dir, "new.bin", &content);

    let signature = load_signature_via_chunks(&old_path);
    let mut patch = PatchFile::new(&old_path, signature.block_size).unwrap();
    for chunk in delta_for_file(&new_path, &signature).unwrap() {
        patch.apply_delta_chunk(&chunk.unwrap()).unwrap();
    }
    let written = patch.commit().unwrap();
    assert_eq!(written as usize, content.len());
    assert_eq!(fs::read(&old_path).unwrap(), content);
}
