//! Which task dialog is open and what it is pointed at.

use taskflow_common::{StatusId, Task};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalState {
    pub create_open: bool,
    pub detail_open: bool,
    pub update_open: bool,
    pub selected_task: Option<Task>,
    /// Column a new task will be created in.
    pub selected_status_id: Option<StatusId>,
}

impl ModalState {
    pub fn open_create(&mut self, status_id: StatusId) {
        self.close_all();
        self.create_open = true;
        self.selected_status_id = Some(status_id);
    }

    pub fn open_detail(&mut self, task: Task) {
        self.close_all();
        self.detail_open = true;
        self.selected_task = Some(task);
    }

    pub fn open_update(&mut self, task: Task) {
        self.close_all();
        self.update_open = true;
        self.selected_task = Some(task);
    }

    pub fn close_all(&mut self) {
        *self = Self::default();
    }

    pub fn is_open(&self) -> bool {
        self.create_open || self.detail_open || self.update_open
    }
}
