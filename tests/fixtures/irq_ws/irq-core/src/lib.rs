pub mod timer;

pub trait Handler {
    fn handle(&self);
}

/// stackcheck: root irq
pub fn irq_entry(h: &dyn Handler) {
    h.handle();
}

pub fn eoi() {
    // stackcheck: irq
}
