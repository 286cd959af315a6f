//! Canonical instances: pooling policies, path independence and concurrency

use std::sync::{Arc, Barrier};
use std::thread;

use ferrum_types::intern::{Interner, StrongInterner, WeakInterner};
use ferrum_types::{
    Age, Base, BasicEnvironment, Code, ComplexType, DecimalValue, Decimal, ExtensionData,
    FhirString, FieldMap, FieldValue, Id, Key,
};

fn seven_and_a_half_weeks() -> Age {
    Age::new(
        Some(Decimal::new("7.5".parse::<DecimalValue>().unwrap())),
        None,
        Some(FhirString::new("wk")),
        None,
        None,
    )
}

#[test]
fn age_is_canonical_on_every_path() {
    let built = seven_and_a_half_weeks();

    let created = Age::create(&FieldMap::from([
        (Key::Value, FieldValue::from("7.5".parse::<DecimalValue>().unwrap())),
        (Key::Unit, FieldValue::from("wk")),
    ]))
    .unwrap();

    let assoced = Age::empty()
        .assoc(Key::Unit, Some(FhirString::new("wk").into()))
        .unwrap()
        .assoc(Key::Value, Some(Decimal::new("7.5".parse::<DecimalValue>().unwrap()).into()))
        .unwrap();

    let decoded = Age::from_json_str(r#"{"value":7.5,"unit":"wk"}"#).unwrap();

    assert!(built.is_interned());
    for other in [&created, &assoced, &decoded] {
        assert!(built.ptr_eq(other));
        assert_eq!(built.content_hash(), other.content_hash());
    }
    assert_eq!(built.mem_size(&BasicEnvironment), 0);
}

#[test]
fn reinterning_a_canonical_instance_returns_itself() {
    let code = Code::new("final");
    let again = Code::from_parts(code.extension_data().clone(), code.value().cloned());
    assert!(code.ptr_eq(&again));
}

#[test]
fn empty_values_collapse_to_one_instance() {
    assert!(Id::empty().ptr_eq(&Id::empty()));
    assert!(Age::empty().ptr_eq(&Age::empty()));
    let cleared = Id::new("x").assoc(Key::Value, None).unwrap();
    assert!(cleared.ptr_eq(&Id::empty()));
}

#[test]
fn hash_ignores_pooling() {
    let long = "a value well past the pooling limit";
    let a = FhirString::new(long);
    let b = FhirString::new(long);
    assert!(!a.is_interned());
    assert!(!a.ptr_eq(&b));
    assert_eq!(a, b);
    assert_eq!(a.content_hash(), b.content_hash());
}

#[test]
fn hash_distinguishes_absent_from_empty_value() {
    let empty_text = FhirString::new("");
    let absent = FhirString::empty();
    assert_ne!(empty_text.content_hash(), absent.content_hash());

    let id = ExtensionData::empty().with_id(Some("e1".into()));
    assert_ne!(
        empty_text.with_extension_data(id.clone()).content_hash(),
        absent.with_extension_data(id).content_hash()
    );
}

#[test]
fn assoc_recomputes_canonical_form() {
    let age = seven_and_a_half_weeks();
    let with_system = age
        .assoc(Key::System, Some(FieldValue::from("http://unitsofmeasure.org")))
        .unwrap();
    assert!(!with_system.is_interned());
    let back = with_system.assoc(Key::System, None).unwrap();
    assert!(back.ptr_eq(&age));
}

#[test]
fn concurrent_interning_yields_one_instance() {
    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                Code::new("concurrently-interned")
            })
        })
        .collect();
    let codes: Vec<Code> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for code in &codes[1..] {
        assert!(codes[0].ptr_eq(code));
    }
}

#[test]
fn concurrent_weak_pool_builds_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn build(key: &String) -> String {
        BUILDS.fetch_add(1, Ordering::SeqCst);
        key.to_uppercase()
    }

    const THREADS: usize = 8;
    let pool: Arc<WeakInterner<String, String>> = Arc::new(WeakInterner::new(build));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.intern("shared")
            })
        })
        .collect();
    let values: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    assert_eq!(*values[0], "SHARED");
    for value in &values[1..] {
        assert!(Arc::ptr_eq(&values[0], value));
    }
}

#[test]
fn weak_pool_rebuilds_after_reclaim() {
    let pool: WeakInterner<String, String> = WeakInterner::new(|key| key.clone());
    let first = pool.intern("k");
    assert_eq!(pool.live_count(), 1);
    drop(first);
    assert_eq!(pool.live_count(), 0);
    pool.sweep();
    assert!(pool.is_empty());

    let second = pool.intern("k");
    assert_eq!(*second, "k");
    assert_eq!(pool.live_count(), 1);
}

#[test]
fn strong_pool_keeps_entries() {
    let pool: StrongInterner<String, usize> = StrongInterner::new(|key| key.len());
    let a = pool.intern("four");
    drop(a);
    assert_eq!(pool.len(), 1);
    let b = pool.intern("four");
    assert_eq!(*b, 4);
    assert!(Arc::ptr_eq(&b, &pool.intern("four")));
}
