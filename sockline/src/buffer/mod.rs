pub mod recv_queue;
pub mod send_queue;

pub use recv_queue::RecvQueue;
pub use send_queue::SendQueue;
