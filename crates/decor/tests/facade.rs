//! Both engines driven through the prelude at one checkpoint.

use std::cell::RefCell;
use std::rc::Rc;

use decor::prelude::*;

#[test]
fn one_checkpoint_drives_both_engines() {
    let scheduler = Scheduler::new();
    let previous = Scheduler::install(scheduler.clone());
    let order = Rc::new(RefCell::new(Vec::new()));

    let class = Class::builder("Counter").property("count", 0).build();
    let counter = Stateful::new(&class);
    let o = Rc::clone(&order);
    let _h0 = observe(&counter, move |old: &OldValues| {
        assert_eq!(old.get("count"), Some(&Value::from(0)));
        o.borrow_mut().push("stateful".to_owned());
    });

    let items = ObservableArray::new();
    let o = Rc::clone(&order);
    let _h1 = items.observe_splices(move |splices: &[Splice]| {
        o.borrow_mut().push(format!("{} splice(s)", splices.len()));
    });

    counter.set("count", 1).unwrap();
    items.push(["x", "y"]);
    assert!(order.borrow().is_empty());
    flush();

    let mut seen = order.borrow().clone();
    seen.sort();
    assert_eq!(seen, vec!["1 splice(s)", "stateful"]);
    Scheduler::install(previous);
}

#[test]
fn lifecycle_releases_record_observers() {
    let scheduler = Scheduler::new();
    let previous = Scheduler::install(scheduler.clone());
    let owner = Lifecycle::new();
    let object = ObservableObject::new();
    let count = Rc::new(RefCell::new(0));
    let c = Rc::clone(&count);
    let callback = ChangeCallback::new(move |_: &[ChangeRecord]| *c.borrow_mut() += 1);

    let handle = object.observe(&callback, None);
    owner.own(Disposable::remove(move || {
        handle.remove();
    }));
    object.set("a", 1);
    scheduler.flush();
    assert_eq!(*count.borrow(), 1);

    owner.destroy();
    object.set("a", 2);
    scheduler.flush();
    assert_eq!(*count.borrow(), 1);
    assert_eq!(object.notifier().observer_count(), 0);
    Scheduler::install(previous);
}
