//! Progress reporting shared by every layer of a conversion.
//!
//! A [`ProgressReporter`] always accepts values in `0..=100` and maps them onto
//! the range it owns before sending them down its channel. Layers hand a
//! narrowed reporter to the layer below with [`ProgressReporter::scoped`].

use tokio::sync::mpsc;

#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<u8>,
    floor: u8,
    ceil: u8,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                floor: 0,
                ceil: 100,
            },
            rx,
        )
    }

    /// A reporter whose events go nowhere.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self::channel().0
    }

    fn map(&self, percent: u8) -> u8 {
        let percent = u32::from(percent.min(100));
        let span = u32::from(self.ceil - self.floor);
        (u32::from(self.floor) + percent * span / 100) as u8
    }

    pub fn report(&self, percent: u8) {
        // A closed receiver only means nobody is watching any more.
        let _ = self.tx.send(self.map(percent));
    }

    /// Narrows this reporter so that `0..=100` below lands in `floor..=ceil` of
    /// this reporter's own range.
    pub fn scoped(&self, floor: u8, ceil: u8) -> Self {
        let (floor, ceil) = (floor.min(100), ceil.min(100));
        let (floor, ceil) = if floor <= ceil { (floor, ceil) } else { (ceil, floor) };
        Self {
            tx: self.tx.clone(),
            floor: self.map(floor),
            ceil: self.map(ceil),
        }
    }
}
