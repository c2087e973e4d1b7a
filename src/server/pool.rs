//! # Pool de Workers
//! src/server/pool.rs
//!
//! Número fijo de threads consumiendo una cola FIFO compartida.
//!
//! La cola puede tener capacidad máxima: `submit` no bloquea, si la cola está
//! llena devuelve el item para que el llamador decida (el listener responde
//! 503). Capacidad 0 significa sin límite.

use log::{debug, error};
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

struct State<T> {
    items: VecDeque<T>,
    shutting_down: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Notifica a los workers cuando hay items nuevos o al cerrar
    available: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Un handler que hizo panic no deja el estado a medias
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pool de threads con cola compartida
pub struct WorkerPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Lanza `size` workers que ejecutan `handler` sobre cada item
    ///
    /// Los threads se llaman `{name}-{i}`.
    pub fn new<F>(name: &str, size: usize, capacity: usize, handler: F) -> io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                items: VecDeque::new(),
                shutting_down: false,
            }),
            available: Condvar::new(),
        });
        let handler = Arc::new(handler);

        let mut pool = Self {
            shared,
            capacity,
            workers: Vec::with_capacity(size),
        };

        for i in 0..size {
            let worker_name = format!("{}-{}", name, i);
            let shared = Arc::clone(&pool.shared);
            let handler = Arc::clone(&handler);

            // Si falla, los workers ya lanzados se cierran en el Drop
            let handle = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || worker_loop(&worker_name, &shared, handler.as_ref()))?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    /// Encola un item sin bloquear
    ///
    /// Retorna `Err(item)` si la cola está llena o el pool se está cerrando.
    pub fn submit(&self, item: T) -> Result<(), T> {
        let mut state = self.shared.lock();

        if state.shutting_down || (self.capacity > 0 && state.items.len() >= self.capacity) {
            return Err(item);
        }

        state.items.push_back(item);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Items esperando un worker
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacidad de la cola (0 = sin límite)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Número de workers
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Deja de aceptar items, procesa lo pendiente y espera a los workers
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutting_down = true;
        }
        self.shared.available.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<T, F>(name: &str, shared: &Shared<T>, handler: &F)
where
    F: Fn(T),
{
    debug!("Worker {} started", name);

    loop {
        let item = {
            let mut state = shared.lock();
            loop {
                if let Some(item) = state.items.pop_front() {
                    break Some(item);
                }
                if state.shutting_down {
                    break None;
                }
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let Some(item) = item else {
            break;
        };

        // Un panic en el handler no debe matar al worker
        if panic::catch_unwind(AssertUnwindSafe(|| handler(item))).is_err() {
            error!("Worker {} recovered from a panicking task", name);
        }
    }

    debug!("Worker {} stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_processes_all_items() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let mut pool = WorkerPool::new("test", 4, 0, move |n: usize| {
            seen.fetch_add(n, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..100 {
            pool.submit(1).unwrap();
        }
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_queue_capacity() {
        // Un solo worker bloqueado hasta que el test lo libere
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);

        let mut pool = WorkerPool::new("cap", 1, 2, move |_: u32| {
            let _ = started_tx.lock().unwrap().send(());
            let _ = release_rx.lock().unwrap().recv();
        })
        .unwrap();

        pool.submit(0).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(pool.submit(1).is_ok());
        assert!(pool.submit(2).is_ok());
        assert_eq!(pool.submit(3), Err(3)); // Cola llena
        assert_eq!(pool.len(), 2);

        for _ in 0..3 {
            release_tx.send(()).unwrap();
        }
        pool.shutdown();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new("closed", 2, 0, |_: u8| {}).unwrap();
        pool.shutdown();

        assert_eq!(pool.submit(7), Err(7));
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_worker_survives_panic() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let mut pool = WorkerPool::new("panic", 1, 0, move |n: u32| {
            if n == 0 {
                panic!("boom");
            }
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.submit(0).unwrap();
        pool.submit(1).unwrap();
        pool.submit(2).unwrap();
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
