//! Deep dependency traversal for watchers.

use std::collections::{BTreeMap, HashSet};

use crate::reactive::{Memo, Signal};

/// Register dependencies on everything reachable from a value.
///
/// Reactive containers and signals track themselves and recurse into their
/// contents; plain values are leaves. `depth` counts reactive container
/// levels still to enter, and `seen` holds the containers already visited so
/// cyclic structures terminate.
pub trait Traverse {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>);
}

macro_rules! leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Traverse for $ty {
                fn traverse(&self, _depth: usize, _seen: &mut HashSet<usize>) {}
            }
        )*
    };
}

leaf!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &'static str,
    serde_json::Value,
);

impl<T: Traverse> Traverse for Option<T> {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        if let Some(value) = self {
            value.traverse(depth, seen);
        }
    }
}

impl<T: Traverse> Traverse for Vec<T> {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        for value in self {
            value.traverse(depth, seen);
        }
    }
}

impl<K, V: Traverse> Traverse for BTreeMap<K, V> {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        for value in self.values() {
            value.traverse(depth, seen);
        }
    }
}

macro_rules! tuple {
    ($($name:ident),+) => {
        impl<$($name: Traverse),+> Traverse for ($($name,)+) {
            #[allow(non_snake_case)]
            fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
                let ($($name,)+) = self;
                $($name.traverse(depth, seen);)+
            }
        }
    };
}

tuple!(A);
tuple!(A, B);
tuple!(A, B, C);
tuple!(A, B, C, D);

impl<T: Traverse + 'static> Traverse for Signal<T> {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        self.with(|value| value.traverse(depth, seen));
    }
}

impl<T: Traverse + 'static> Traverse for Memo<T> {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        self.with(|value| value.traverse(depth, seen));
    }
}
