use crate::SerializeField;

impl SerializeField for u32 {
    fn serialize_field(&self, buf: &mut [u8], offset: &mut usize) {
        let bytes = self.to_le_bytes();
        if *offset + 4 <= buf.len() {
            buf[*offset..*offset + 4].copy_from_slice(&bytes);
            *offset += 4;
        }
    }
}

impl SerializeField for i32 {
    fn serialize_field(&self, buf: &mut [u8], offset: &mut usize) {
        (*self as u32).serialize_field(buf, offset);
    }
}

impl SerializeField for u64 {
    fn serialize_field(&self, buf: &mut [u8], offset: &mut usize) {
        let bytes = self.to_le_bytes();
        if *offset + 8 <= buf.len() {
            buf[*offset..*offset + 8].copy_from_slice(&bytes);
            *offset += 8;
        }
    }
}

impl SerializeField for i64 {
    fn serialize_field(&self, buf: &mut [u8], offset: &mut usize) {
        (*self as u64).serialize_field(buf, offset);
    }
}
