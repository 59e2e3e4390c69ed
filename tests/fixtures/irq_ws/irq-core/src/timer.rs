pub struct Timer;

impl crate::Handler for Timer {
    fn handle(&self) {
        crate::eoi();
    }
}
