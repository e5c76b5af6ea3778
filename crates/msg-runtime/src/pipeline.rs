//! Ordered chain of `(session, message) -> Result<()>` stages, applied
//! before inbound dispatch or after outbound enqueue. A node holds two
//! independent `Pipeline`s — inbound and outbound.

use std::sync::RwLock;

use msg_wire::Message;

use crate::error::SessionError;
use crate::session::Session;

pub type Stage = Box<dyn Fn(&Session, &Message) -> Result<(), SessionError> + Send + Sync>;

#[derive(Default)]
pub struct Pipeline {
    stages: RwLock<Vec<Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn push_front(&self, stage: Stage) {
        self.stages.write().unwrap().insert(0, stage);
    }

    pub fn push_back(&self, stage: Stage) {
        self.stages.write().unwrap().push(stage);
    }

    /// Run every stage in order under a read lock. The first error aborts
    /// processing and is returned to the caller; the message is dropped.
    pub fn process(&self, session: &Session, msg: &Message) -> Result<(), SessionError> {
        for stage in self.stages.read().unwrap().iter() {
            stage(session, msg)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stages.read().unwrap().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityKind};

    fn session() -> Session {
        let (entity, _rx) = Entity::new(EntityKind::Gate, "127.0.0.1:1".to_string());
        Session::new(1, entity, 0)
    }

    #[test]
    fn stages_run_in_registration_order_until_one_errors() {
        let pipeline = Pipeline::new();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        pipeline.push_back(Box::new(move |_, _| {
            o1.lock().unwrap().push(1);
            Ok(())
        }));
        let o2 = order.clone();
        pipeline.push_back(Box::new(move |_, _| {
            o2.lock().unwrap().push(2);
            Err(SessionError::PipelineAbort("no auth".to_string()))
        }));
        let o3 = order.clone();
        pipeline.push_back(Box::new(move |_, _| {
            o3.lock().unwrap().push(3);
            Ok(())
        }));

        let s = session();
        let msg = Message::notify("Room.Join", vec![]);
        let result = pipeline.process(&s, &msg);
        assert!(result.is_err());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn push_front_runs_before_existing_stages() {
        let pipeline = Pipeline::new();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        pipeline.push_back(Box::new(move |_, _| {
            o1.lock().unwrap().push("back");
            Ok(())
        }));
        let o2 = order.clone();
        pipeline.push_front(Box::new(move |_, _| {
            o2.lock().unwrap().push("front");
            Ok(())
        }));
        let s = session();
        let msg = Message::notify("Room.Join", vec![]);
        pipeline.process(&s, &msg).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["front", "back"]);
    }
}
