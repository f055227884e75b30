//! End-to-end scenarios: annotated modules before and after the pass.

use polymask_field::ntheory::modpow_host;
use polymask_ir::{
    verify_module, FunctionBuilder, GlobalId, Linkage, Machine, Module, Ty, Value,
    GLOBAL_ANNOTATIONS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::annotations::{read_annotations, tag_text};
use crate::transform_module;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn annotated_table(m: &mut Module, name: &str, values: Vec<i64>) -> GlobalId {
    let len = values.len();
    let data = m.const_data_array(values);
    let gid = m.add_global(name, Ty::I32.array_of(len), true, Linkage::Private, Some(data));
    m.annotate_global(gid, "interpolate");
    gid
}

/// `fn <name>(i64 i) -> i32 { return <table>[i]; }`
fn add_lookup(m: &mut Module, name: &str, table: GlobalId) {
    let base = m.global_ref(table);
    let mut b = FunctionBuilder::new(m, name, vec![Ty::I64], Ty::I32, Linkage::External);
    let zero = b.const_i64(0);
    let idx = b.arg(0);
    let ptr = b.gep(Value::Const(base), zero, idx);
    let v = b.load(ptr);
    b.ret(Some(v));
    b.finish();
}

/// `fn <name>() -> void { <table>[0] = 5; }`
fn add_store(m: &mut Module, name: &str, table: GlobalId) {
    let base = m.global_ref(table);
    let mut b = FunctionBuilder::new(m, name, vec![], Ty::Void, Linkage::External);
    let zero = b.const_i64(0);
    let ptr = b.gep(Value::Const(base), zero, zero);
    let five = b.const_i32(5);
    b.store(five, ptr);
    b.ret(None);
    b.finish();
}

fn run_table(m: &Module, func: &str, indices: std::ops::Range<i64>) -> Vec<i64> {
    let mut machine = Machine::new(m);
    machine.bind("modpow", modpow_host);
    indices
        .map(|i| machine.call(func, &[i]).unwrap())
        .collect()
}

#[test]
fn identity_table_is_absorbed() {
    init_logger();
    let mut m = Module::new("s1");
    let table = annotated_table(&mut m, "T", vec![0, 1, 2, 3]);
    add_lookup(&mut m, "lookup", table);
    verify_module(&m).expect("input module is well-formed");

    assert!(transform_module(&mut m).unwrap());
    assert!(m.global_by_name("T").is_none());
    assert!(m.func_by_name("poly_T").is_some());
    assert_eq!(run_table(&m, "lookup", 0..4), vec![0, 1, 2, 3]);
}

#[test]
fn nonlinear_table_is_absorbed() {
    init_logger();
    let mut m = Module::new("s2");
    let table = annotated_table(&mut m, "T", vec![7, 2, 9, 4, 1]);
    add_lookup(&mut m, "lookup", table);

    assert!(transform_module(&mut m).unwrap());
    assert!(m.global_by_name("T").is_none());
    assert_eq!(run_table(&m, "lookup", 0..5), vec![7, 2, 9, 4, 1]);
    // The absorbed table's name survives only in the evaluator's name.
    assert!(!m.to_string().contains("@T"));
}

#[test]
fn stored_to_table_is_preserved_byte_identical() {
    init_logger();
    let mut m = Module::new("s3");
    let table = annotated_table(&mut m, "T", vec![0, 1, 2, 3]);
    add_lookup(&mut m, "lookup", table);
    add_store(&mut m, "poke", table);

    let before = m.to_string();
    assert!(!transform_module(&mut m).unwrap());
    assert_eq!(m.to_string(), before);
}

#[test]
fn wrong_element_type_is_preserved() {
    init_logger();
    let mut m = Module::new("s4");
    let elems = (0..3).map(|i| m.const_int(Ty::I64, i)).collect();
    let init = m.const_array(Ty::I64, elems);
    let table = m.add_global("T", Ty::I64.array_of(3), true, Linkage::Private, Some(init));
    m.annotate_global(table, "interpolate");

    let before = m.to_string();
    assert!(!transform_module(&mut m).unwrap());
    assert_eq!(m.to_string(), before);
    assert!(m.global_by_name("T").is_some());
}

#[test]
fn partial_success_keeps_only_failed_entry() {
    init_logger();
    let mut m = Module::new("s5");
    let a = annotated_table(&mut m, "A", vec![1, 2, 3]);
    add_lookup(&mut m, "lookup_a", a);
    let b = annotated_table(&mut m, "B", vec![5, 5]);
    add_lookup(&mut m, "lookup_b", b);
    add_store(&mut m, "poke_b", b);

    assert!(transform_module(&mut m).unwrap());
    assert!(m.global_by_name("A").is_none());
    assert!(m.global_by_name("B").is_some());

    let entries = read_annotations(&m);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, Some(b));
    assert_eq!(tag_text(&m, entries[0].tag.unwrap()), Some("interpolate"));

    assert_eq!(run_table(&m, "lookup_a", 0..3), vec![1, 2, 3]);
    assert_eq!(run_table(&m, "lookup_b", 0..2), vec![5, 5]);
}

#[test]
fn emptied_annotation_array_is_erased() {
    init_logger();
    let mut m = Module::new("s6");
    let table = annotated_table(&mut m, "T", vec![11, 22]);
    add_lookup(&mut m, "lookup", table);

    assert!(transform_module(&mut m).unwrap());
    assert!(m.global_by_name(GLOBAL_ANNOTATIONS).is_none());
}

#[test]
fn module_without_annotations_is_untouched() {
    init_logger();
    let mut m = Module::new("plain");
    let data = m.const_data_array(vec![1, 2]);
    let table = m.add_global("T", Ty::I32.array_of(2), true, Linkage::Private, Some(data));
    add_lookup(&mut m, "lookup", table);

    let before = m.to_string();
    assert!(!transform_module(&mut m).unwrap());
    assert_eq!(m.to_string(), before);
}

#[test]
fn foreign_tags_are_preserved() {
    init_logger();
    let mut m = Module::new("tagged");
    let data = m.const_data_array(vec![3, 1]);
    let table = m.add_global("T", Ty::I32.array_of(2), true, Linkage::Private, Some(data));
    m.annotate_global(table, "keep_me");

    assert!(!transform_module(&mut m).unwrap());
    assert!(m.global_by_name("T").is_some());
    assert_eq!(read_annotations(&m).len(), 1);
}

#[test]
fn doubly_annotated_table_is_preserved() {
    // A second tag gives the wiring cast two entry users, which breaks the
    // one-user spine the eligibility check demands.
    init_logger();
    let mut m = Module::new("doubly");
    let table = annotated_table(&mut m, "T", vec![1, 2]);
    m.annotate_global(table, "keep_me");
    add_lookup(&mut m, "lookup", table);

    assert!(!transform_module(&mut m).unwrap());
    assert!(m.global_by_name("T").is_some());
    assert_eq!(read_annotations(&m).len(), 2);
}

#[test]
fn transformed_modules_agree_with_the_original() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0x7461626c);
    for len in 1..=10usize {
        let values: Vec<i64> = (0..len).map(|_| rng.gen_range(0..1_000_000)).collect();
        let mut m = Module::new("agree");
        let table = annotated_table(&mut m, "T", values.clone());
        add_lookup(&mut m, "lookup", table);

        let before = run_table(&m, "lookup", 0..len as i64);
        assert!(transform_module(&mut m).unwrap());
        let after = run_table(&m, "lookup", 0..len as i64);
        assert_eq!(before, after, "table {values:?}");
    }
}

#[test]
fn constant_form_load_site_is_rewritten() {
    init_logger();
    let mut m = Module::new("cform");
    let table = annotated_table(&mut m, "T", vec![9, 8, 7]);
    let base = m.global_ref(table);
    let addr = m.const_gep(base, vec![0, 2]);
    let mut b = FunctionBuilder::new(&mut m, "third", vec![], Ty::I32, Linkage::External);
    let v = b.load(Value::Const(addr));
    b.ret(Some(v));
    b.finish();

    assert!(transform_module(&mut m).unwrap());
    assert!(m.global_by_name("T").is_none());
    let mut machine = Machine::new(&m);
    machine.bind("modpow", modpow_host);
    assert_eq!(machine.call("third", &[]).unwrap(), 7);
}
