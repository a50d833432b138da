//! Change-type mask carried by kernel events.

use bitflags::bitflags;

bitflags! {
    /// Kind of change reported for a path.
    ///
    /// Bit values match the Linux inotify constants, so a mask can be
    /// compared against `IN_*` values directly. The registry passes masks
    /// through untouched; interpreting them is up to the handler.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
        const UNMOUNT = 0x0000_2000;
        const Q_OVERFLOW = 0x0000_4000;
        const IGNORED = 0x0000_8000;
        const ISDIR = 0x4000_0000;
    }
}

impl EventMask {
    /// Short names of the set flags, joined with `|`. Used for log and CLI output.
    pub fn describe(self) -> String {
        if self.is_empty() {
            return "NONE".to_string();
        }
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inotify_values() {
        assert_eq!(EventMask::CREATE.bits(), 0x100);
        assert_eq!(EventMask::DELETE_SELF.bits(), 0x400);
        assert_eq!(EventMask::ISDIR.bits(), 0x4000_0000);
    }

    #[test]
    fn test_describe() {
        assert_eq!(EventMask::empty().describe(), "NONE");
        assert_eq!((EventMask::CREATE | EventMask::ISDIR).describe(), "CREATE|ISDIR");
    }
}
