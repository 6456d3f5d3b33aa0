//! End-to-end scenarios: source through codegen, assembly, and linking,
//! executed on the VM, with assertions on machine state afterward.

use sin_core::memmap::RS_START;
use sin_vm::Vm;
use sinc::{compile_source, CompilerConfig};

/// Build a program and run it to completion.
fn run(source: &str) -> Vm {
    let binary = compile_source(source, &CompilerConfig::default(), None)
        .expect("program should compile");
    let mut vm = Vm::new(&binary).expect("binary should load");
    vm.run().expect("program should run to halt");
    vm
}

/// Address of the nth word reserved by the program object. The program
/// object is linked first, so its `@rs` variables start the reserved page.
fn global(n: u16) -> u16 {
    RS_START + 2 * n
}

#[test]
fn hand_written_assembly_runs() {
    // the later pipeline stages work without the compiler in front
    let source = "\
start:
\tloada #$2A
\tstorea $0100
\tloadb $0100
\thalt
";
    let object = sin_asm::Assembler::new(sin_core::Wordsize::W16)
        .assemble(source)
        .unwrap();
    let binary = sin_asm::Linker::new(vec![object]).unwrap().link().unwrap();
    let mut vm = Vm::new(&binary).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.b, 0x2A);
}

#[test]
fn int_allocation_and_addition() {
    // x, y, z are the first three reserved words
    let vm = run("alloc int x: 10;\nalloc int y: 32;\nalloc int z: x + y;");
    assert_eq!(vm.read_word(global(0)).unwrap(), 10);
    assert_eq!(vm.read_word(global(1)).unwrap(), 32);
    assert_eq!(vm.read_word(global(2)).unwrap(), 0x002A);
}

#[test]
fn string_concatenation() {
    let vm = run("alloc string s: \"ab\" + \"cd\";");
    let heap_address = vm.read_word(global(0)).unwrap();
    assert_ne!(heap_address, 0, "s must point at heap storage");
    assert_eq!(vm.read_word(heap_address).unwrap(), 4, "length word");
    let bytes: Vec<u8> = (0..4).map(|i| vm.read_byte(heap_address + 2 + i)).collect();
    assert_eq!(bytes, b"abcd");
}

#[test]
fn while_countdown_terminates_at_zero() {
    let vm = run("alloc int i: 3;\nwhile (i > 0) { let i = i - 1; }");
    assert_eq!(vm.read_word(global(0)).unwrap(), 0);
}

#[test]
fn function_call_with_default_argument() {
    let vm = run(
        "def int add(alloc int a, alloc int b: 1) { return a + b; }\nalloc int r: @add(41);",
    );
    assert_eq!(vm.read_word(global(0)).unwrap(), 42);
}

#[test]
fn function_call_with_both_arguments() {
    let vm = run(
        "def int add(alloc int a, alloc int b: 1) { return a + b; }\nalloc int r: @add(40, 60);",
    );
    assert_eq!(vm.read_word(global(0)).unwrap(), 100);
}

#[test]
fn if_else_takes_the_right_branch() {
    let vm = run(
        "alloc int x: 5;\nalloc int r: 0;\nif x > 3 { let r = 1; } else { let r = 2; }",
    );
    assert_eq!(vm.read_word(global(1)).unwrap(), 1);

    let vm = run(
        "alloc int x: 2;\nalloc int r: 0;\nif x > 3 { let r = 1; } else { let r = 2; }",
    );
    assert_eq!(vm.read_word(global(1)).unwrap(), 2);
}

#[test]
fn unary_minus_and_not() {
    let vm = run("alloc int x: 0 - 5;\nalloc int y: x + 7;");
    assert_eq!(vm.read_word(global(1)).unwrap(), 2);

    let vm = run("alloc bool t: not false;\nalloc bool f: not true;");
    assert_eq!(vm.read_word(global(0)).unwrap(), 1);
    assert_eq!(vm.read_word(global(1)).unwrap(), 0);
}

#[test]
fn modulo_and_division() {
    let vm = run("alloc int q: 43 / 5;\nalloc int m: 43 % 5;");
    assert_eq!(vm.read_word(global(0)).unwrap(), 8);
    assert_eq!(vm.read_word(global(1)).unwrap(), 3);
}

#[test]
fn global_array_initializer_and_indexing() {
    let vm = run("alloc array<3, int> a: { 7, 8, 9 };\nalloc int second: a[1];");
    assert_eq!(vm.read_word(global(0)).unwrap(), 7);
    assert_eq!(vm.read_word(global(0) + 2).unwrap(), 8);
    assert_eq!(vm.read_word(global(0) + 4).unwrap(), 9);
    // the array claims three words; `second` follows it
    assert_eq!(vm.read_word(global(3)).unwrap(), 8);
}

#[test]
fn global_indexed_assignment() {
    let vm = run("alloc array<2, int> a: { 1, 2 };\nlet a[1] = 42;");
    assert_eq!(vm.read_word(global(0) + 2).unwrap(), 42);
}

#[test]
fn pointer_address_of_and_dereference() {
    let vm = run(
        "alloc int v: 11;\nalloc ptr<int> p: $v;\nalloc int copy: *p;\nlet *p = 99;",
    );
    assert_eq!(vm.read_word(global(2)).unwrap(), 11, "copy = *p");
    assert_eq!(vm.read_word(global(0)).unwrap(), 99, "*p = 99 writes v");
}

#[test]
fn dynamic_int_allocation_and_free() {
    let vm = run("alloc dynamic int x: 5;\nalloc int copy: x;\nfree x;");
    assert_eq!(vm.read_word(global(1)).unwrap(), 5);
    // the heap block was released; the pointer slot still names it
    let heap_address = vm.read_word(global(0)).unwrap();
    assert_ne!(heap_address, 0);
}

#[test]
fn string_variable_reassignment_reallocates() {
    let vm = run("alloc string s: \"hi\";\nlet s = \"longer text\";");
    let heap_address = vm.read_word(global(0)).unwrap();
    assert_eq!(vm.read_word(heap_address).unwrap(), 11);
    let bytes: Vec<u8> = (0..11).map(|i| vm.read_byte(heap_address + 2 + i)).collect();
    assert_eq!(bytes, b"longer text");
}

#[test]
fn nested_function_calls() {
    let vm = run(
        "def int double(alloc int n) { return n + n; }\n\
         def int quadruple(alloc int n) { alloc int d: @double(n); return @double(d); }\n\
         alloc int r: @quadruple(5);",
    );
    assert_eq!(vm.read_word(global(0)).unwrap(), 20);
}

#[test]
fn local_variables_inside_functions() {
    let vm = run(
        "def int sum_to(alloc int n) {\n\
             alloc int total: 0;\n\
             alloc int i: n;\n\
             while (i > 0) { let total = total + i; let i = i - 1; }\n\
             return total;\n\
         }\n\
         alloc int r: @sum_to(4);",
    );
    assert_eq!(vm.read_word(global(0)).unwrap(), 10);
}

#[test]
fn comparison_operators() {
    let vm = run(
        "alloc bool lt: 1 < 2;\nalloc bool gt: 1 > 2;\nalloc bool eq: 2 = 2;\n\
         alloc bool ne: 2 != 2;\nalloc bool ge: 2 >= 2;\nalloc bool le: 3 <= 2;",
    );
    assert_eq!(vm.read_word(global(0)).unwrap(), 1);
    assert_eq!(vm.read_word(global(1)).unwrap(), 0);
    assert_eq!(vm.read_word(global(2)).unwrap(), 1);
    assert_eq!(vm.read_word(global(3)).unwrap(), 0);
    assert_eq!(vm.read_word(global(4)).unwrap(), 1);
    assert_eq!(vm.read_word(global(5)).unwrap(), 0);
}

#[test]
fn inline_assembly_executes() {
    let vm = run("alloc int x: 0;\nasm<sinasm16> {\n\tloada #$1234\n\tstorea x\n};");
    assert_eq!(vm.read_word(global(0)).unwrap(), 0x1234);
}

#[test]
fn sizeof_is_one_word() {
    let vm = run("alloc int s: sizeof< int >;");
    assert_eq!(vm.read_word(global(0)).unwrap(), 2);
}

#[test]
fn local_array_roundtrip_in_function() {
    let vm = run(
        "def int pick(alloc int which) {\n\
             alloc array<3, int> values: { 10, 20, 30 };\n\
             return values[which];\n\
         }\n\
         alloc int r: @pick(2);",
    );
    assert_eq!(vm.read_word(global(0)).unwrap(), 30);
}

#[test]
fn string_argument_passing() {
    let vm = run(
        "def int strlen(alloc string s) { return s; }\n\
         alloc string greeting: \"hello\";\n\
         alloc int len: @strlen(greeting);",
    );
    // returning a string leaves its length in A, which is what the int
    // allocation stores
    assert_eq!(vm.read_word(global(1)).unwrap(), 5);
}
