//! Producers of exported values
//!
//! The [Provide] trait gives a uniform API to both constant exports (the provider
//! holds the value) and computed exports (the provider wraps a constructor function).

use std::sync::Arc;

/// Provide an instance of a given type
pub trait Provide<T>: Send + Sync {
    fn provide(&self) -> T;
}

/// Shared trait object implementing [Provide]
pub type Provider<T> = Arc<dyn Provide<T>>;

/// Generic clone-based provider
pub struct SingletonProvider<T>(T);

impl<T> SingletonProvider<T> {
    pub fn build(data: T) -> Arc<Self> {
        Arc::new(SingletonProvider(data))
    }
}

impl<T: Clone + Send + Sync> Provide<T> for SingletonProvider<T> {
    fn provide(&self) -> T {
        self.0.clone()
    }
}

/// Generic provider calling a constructor function on each request
pub struct InstanceProvider<F> {
    constructor: F,
}

impl<F> InstanceProvider<F> {
    pub fn build(constructor: F) -> Arc<Self> {
        Arc::new(Self { constructor })
    }
}

impl<T, F: Fn() -> T + Send + Sync> Provide<T> for InstanceProvider<F> {
    fn provide(&self) -> T {
        (self.constructor)()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn singleton_provides_clones() {
        let provider: Provider<Arc<String>> = SingletonProvider::build(Arc::new("shared".to_string()));
        let (a, b) = (provider.provide(), provider.provide());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn instance_provider_calls_its_constructor_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider: Provider<usize> = InstanceProvider::build(move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(provider.provide(), 0);
        assert_eq!(provider.provide(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
