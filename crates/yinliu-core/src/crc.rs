//! CRC 校验和计算.
//!
//! 提供 Ogg 页面使用的 CRC-32 (多项式 0x04C11DB7, 初始值 0, 不反射, 无最终异或).

/// CRC-32 查找表 (多项式 0x04C11DB7)
const OGG_CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// 在已有 CRC 值基础上继续累加数据
///
/// 允许分段计算, 例如跳过页面头中的 CRC 字段.
pub fn ogg_crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ OGG_CRC32_TABLE[(((crc >> 24) as u8) ^ byte) as usize];
    }
    crc
}

/// 计算 Ogg CRC-32
pub fn ogg_crc32(data: &[u8]) -> u32 {
    ogg_crc32_update(0, data)
}
