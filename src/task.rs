//! Tasks, their buffers and the ordered task registry.
//!
//! Tasks live in an arena ([`TaskSet`]) and are referred to by [`TaskId`];
//! pins hold a `TaskId` rather than a pointer. Analog-in, analog-out and
//! digital-out each get one session-wide task shared by every device, while
//! counter pins get a dedicated task each.
//!
//! The [`TaskRegistry`] is the sequence tasks are timed, started and stopped
//! in. Its front element owns the shared sample clock and is the task
//! `sync_sampling` waits on.

use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

use crate::io_mode::IoMode;
use crate::provider::TaskHandle;

/// Index of a task in its session's [`TaskSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    /// Arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-task sample buffer, one element per bound pin in bind order.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskBuffer {
    /// Analog and counter samples
    Float(Vec<f64>),
    /// Digital port words
    Digital(Vec<u32>),
}

impl TaskBuffer {
    /// Zeroed buffer with the element type of `io_mode`.
    pub fn zeroed(io_mode: IoMode, len: usize) -> Self {
        match io_mode {
            IoMode::DigitalIn | IoMode::DigitalOut => Self::Digital(vec![0; len]),
            _ => Self::Float(vec![0.0; len]),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Digital(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Float view, if this is an analog or counter buffer.
    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            Self::Digital(_) => None,
        }
    }

    /// Mutable float view.
    pub fn as_float_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            Self::Float(v) => Some(v),
            Self::Digital(_) => None,
        }
    }

    /// Digital view, if this is a digital buffer.
    pub fn as_digital(&self) -> Option<&[u32]> {
        match self {
            Self::Digital(v) => Some(v),
            Self::Float(_) => None,
        }
    }

    /// Mutable digital view.
    pub fn as_digital_mut(&mut self) -> Option<&mut [u32]> {
        match self {
            Self::Digital(v) => Some(v),
            Self::Float(_) => None,
        }
    }
}

/// One provider task and the pins bound into it.
#[derive(Debug, Clone)]
pub struct Task {
    handle: TaskHandle,
    io_mode: IoMode,
    pin_count: usize,
    buffer: Option<TaskBuffer>,
}

impl Task {
    /// Wrap a freshly created provider task.
    pub fn new(handle: TaskHandle, io_mode: IoMode) -> Self {
        Self {
            handle,
            io_mode,
            pin_count: 0,
            buffer: None,
        }
    }

    /// Provider handle.
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// I/O class.
    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    /// Number of bound pins.
    pub fn pin_count(&self) -> usize {
        self.pin_count
    }

    /// Reserve the next buffer slot and return its offset.
    pub(crate) fn add_pin(&mut self) -> usize {
        self.pin_count += 1;
        self.pin_count - 1
    }

    /// Sample buffer, present only while running.
    pub fn buffer(&self) -> Option<&TaskBuffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn buffer_mut(&mut self) -> Option<&mut TaskBuffer> {
        self.buffer.as_mut()
    }

    pub(crate) fn allocate_buffer(&mut self) {
        self.buffer = Some(TaskBuffer::zeroed(self.io_mode, self.pin_count));
    }

    pub(crate) fn release_buffer(&mut self) {
        self.buffer = None;
    }
}

/// Insertion-ordered task registry without duplicates.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    order: VecDeque<TaskId>,
}

impl TaskRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `task` first, removing any earlier entry for it.
    pub fn push_front(&mut self, task: TaskId) {
        self.order.retain(|t| *t != task);
        self.order.push_front(task);
    }

    /// Append `task` unless it is already registered.
    pub fn push_back(&mut self, task: TaskId) {
        if !self.contains(task) {
            self.order.push_back(task);
        }
    }

    /// Whether `task` is registered.
    pub fn contains(&self, task: TaskId) -> bool {
        self.order.contains(&task)
    }

    /// Primary task.
    pub fn first(&self) -> Option<TaskId> {
        self.order.front().copied()
    }

    /// Tasks in order.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.order.iter().copied()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget every task.
    pub fn clear(&mut self) {
        self.order.clear();
    }
}

/// Arena of every task in a session.
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tasks: Vec<Task>,
    singletons: [Option<TaskId>; IoMode::COUNT],
    counters: Vec<TaskId>,
}

impl TaskSet {
    /// Store a task and return its id.
    pub fn insert(&mut self, task: Task) -> TaskId {
        let id = TaskId(self.tasks.len());
        if task.io_mode().is_counter() {
            self.counters.push(id);
        } else {
            self.singletons[task.io_mode().index()] = Some(id);
        }
        self.tasks.push(task);
        id
    }

    /// Task by id.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    /// Mutable task by id.
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id.0)
    }

    /// The session-wide task of a non-counter class.
    pub fn singleton(&self, io_mode: IoMode) -> Option<TaskId> {
        self.singletons[io_mode.index()]
    }

    /// Counter tasks in creation order.
    pub fn counters(&self) -> &[TaskId] {
        &self.counters
    }

    /// Every task with its id.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks.iter().enumerate().map(|(i, t)| (TaskId(i), t))
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task exists.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Remove every task, returning them in creation order.
    pub fn drain(&mut self) -> Vec<Task> {
        self.singletons = [None; IoMode::COUNT];
        self.counters.clear();
        std::mem::take(&mut self.tasks)
    }
}

impl Index<TaskId> for TaskSet {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }
}

impl IndexMut<TaskId> for TaskSet {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_front_moves_without_duplicates() {
        let mut registry = TaskRegistry::new();
        registry.push_back(TaskId(0));
        registry.push_back(TaskId(1));
        registry.push_back(TaskId(0));
        assert_eq!(registry.len(), 2);

        registry.push_front(TaskId(1));
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec![TaskId(1), TaskId(0)]);
        assert_eq!(registry.first(), Some(TaskId(1)));
    }

    #[test]
    fn test_task_set_tracks_singletons_and_counters() {
        let mut set = TaskSet::default();
        let ai = set.insert(Task::new(TaskHandle(1), IoMode::AnalogIn));
        let c0 = set.insert(Task::new(TaskHandle(2), IoMode::CounterAngleIn));
        let c1 = set.insert(Task::new(TaskHandle(3), IoMode::CounterAngleIn));

        assert_eq!(set.singleton(IoMode::AnalogIn), Some(ai));
        assert_eq!(set.singleton(IoMode::CounterAngleIn), None);
        assert_eq!(set.counters(), &[c0, c1]);

        let drained = set.drain();
        assert_eq!(drained.len(), 3);
        assert!(set.is_empty());
        assert_eq!(set.singleton(IoMode::AnalogIn), None);
    }

    #[test]
    fn test_buffer_element_types() {
        let mut task = Task::new(TaskHandle(7), IoMode::DigitalOut);
        assert_eq!(task.add_pin(), 0);
        assert_eq!(task.add_pin(), 1);
        task.allocate_buffer();
        assert_eq!(task.buffer(), Some(&TaskBuffer::Digital(vec![0, 0])));

        let mut task = Task::new(TaskHandle(8), IoMode::CounterAngleIn);
        task.add_pin();
        task.allocate_buffer();
        assert_eq!(task.buffer().and_then(TaskBuffer::as_float), Some(&[0.0][..]));
        task.release_buffer();
        assert!(task.buffer().is_none());
    }
}
