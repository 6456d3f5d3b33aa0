//! Include resolution through real files.

use std::fs;

use sin_asm::{Assembler, Linker};
use sin_core::object::SymbolClass;
use sin_core::ObjectFile;

#[test]
fn include_of_assembly_source_assembles_and_links() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(
        dir.path().join("lib.sina"),
        "helper:\n\tloada #$2A\n\trts\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.sina"),
        "@include lib.sina\n\tjsr helper\n\thalt\n",
    )
    .unwrap();

    let (object, dependencies) = Assembler::assemble_file(&dir.path().join("main.sina")).unwrap();

    // the included unit was assembled to an object next to its source
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].ends_with("lib.sinc"));
    assert!(dependencies[0].exists());

    // main references helper but does not define it
    assert!(object.relocations.iter().any(|r| r.name == "helper"));
    assert!(!object
        .symbols
        .iter()
        .any(|s| s.name == "helper" && s.class == SymbolClass::Defined));

    // linking the pair resolves the call
    let mut file = fs::File::open(&dependencies[0]).unwrap();
    let library = ObjectFile::read(&mut file).unwrap();
    let binary = Linker::new(vec![object, library]).unwrap().link().unwrap();
    assert!(!binary.bytes.is_empty());
}

#[test]
fn include_of_object_file_is_recorded() {
    let dir = tempfile::tempdir().unwrap();

    // produce an object to include
    let mut helper = Assembler::new(sin_core::Wordsize::W16);
    let object = helper.assemble("helper:\n\trts\n").unwrap();
    let mut file = fs::File::create(dir.path().join("lib.sinc")).unwrap();
    object.write(&mut file).unwrap();

    fs::write(
        dir.path().join("main.sina"),
        "@include lib.sinc\n\tjsr helper\n\thalt\n",
    )
    .unwrap();

    let (_object, dependencies) = Assembler::assemble_file(&dir.path().join("main.sina")).unwrap();
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].ends_with("lib.sinc"));
}

#[test]
fn include_of_unknown_format_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.sina"), "@include notes.txt\n").unwrap();
    let err = Assembler::assemble_file(&dir.path().join("main.sina")).unwrap_err();
    assert!(err.message().contains("not supported"));
}
