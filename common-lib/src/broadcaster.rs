use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::mpsc::{Receiver, sync_channel, SyncSender, TrySendError};
use log::warn;

/// Creates a non-blocking fan-out channel.  Every subscriber owns a private bounded queue of
/// `capacity` entries and is tracked by id in a shared registry.  Receivers detach themselves
/// when dropped; a receiver that is still alive but has stopped draining is detached on the
/// next send rather than ever blocking the sender.
pub fn broadcast_channel<T>(capacity: usize) -> (BroadcastSender<T>, BroadcastReceiver<T>) {
  let registry = Arc::new(Mutex::new(SubscriberRegistry {
    next_id: 0,
    queues: HashMap::new(),
    capacity,
  }));
  let sender = BroadcastSender { registry };
  let receiver = sender.subscribe();
  (sender, receiver)
}

#[derive(Clone)]
pub struct BroadcastSender<T> {
  registry: Arc<Mutex<SubscriberRegistry<T>>>,
}

impl<T: Clone> BroadcastSender<T> {
  /// Non-blocking broadcast.  A subscriber whose queue is full, or whose receiver vanished
  /// without detaching, is removed from the registry by id so a slow consumer can never
  /// stall the sending loop.
  pub fn send_to_all(&self, event: &T) {
    let mut registry = self.registry.lock().unwrap();
    let mut dead = Vec::new();
    for (id, queue) in &registry.queues {
      match queue.try_send(event.clone()) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
          warn!("Subscriber {id} stopped draining, detaching it");
          dead.push(*id);
        }
        Err(TrySendError::Disconnected(_)) => dead.push(*id),
      }
    }
    for id in dead {
      registry.queues.remove(&id);
    }
  }
}

impl<T> BroadcastSender<T> {
  pub fn subscribe(&self) -> BroadcastReceiver<T> {
    let (id, rx) = self.registry.lock().unwrap().attach();
    BroadcastReceiver {
      id,
      rx,
      registry: self.registry.clone(),
    }
  }

  pub fn num_subscribers(&self) -> usize {
    self.registry.lock().unwrap().queues.len()
  }
}

pub struct BroadcastReceiver<T> {
  id: u64,
  rx: Receiver<T>,
  registry: Arc<Mutex<SubscriberRegistry<T>>>,
}

impl<T> BroadcastReceiver<T> {
  pub fn rx(&self) -> &Receiver<T> {
    &self.rx
  }
}

impl<T> Clone for BroadcastReceiver<T> {
  fn clone(&self) -> Self {
    let (id, rx) = self.registry.lock().unwrap().attach();
    BroadcastReceiver {
      id,
      rx,
      registry: self.registry.clone(),
    }
  }
}

impl<T> Drop for BroadcastReceiver<T> {
  fn drop(&mut self) {
    self.registry.lock().unwrap().queues.remove(&self.id);
  }
}

struct SubscriberRegistry<T> {
  next_id: u64,
  queues: HashMap<u64, SyncSender<T>>,
  capacity: usize,
}

impl<T> SubscriberRegistry<T> {
  fn attach(&mut self) -> (u64, Receiver<T>) {
    let id = self.next_id;
    self.next_id += 1;
    let (tx, rx) = sync_channel(self.capacity);
    self.queues.insert(id, tx);
    (id, rx)
  }
}
