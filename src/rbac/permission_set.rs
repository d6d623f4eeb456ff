use std::time::SystemTime;

/// Предел идентификаторов прав, представимых в битовой карте.
pub const MAX_PERMISSIONS: usize = 1024;

const WORDS: usize = MAX_PERMISSIONS / 32;

/// Снимок эффективных прав пользователя: битовая карта по
/// идентификаторам плюс счётчик добавлений.
#[derive(Debug, Clone)]
pub struct PermissionSet {
    bits: [u32; WORDS],
    /// Число добавлений, по одному на каждое ребро роль-право.
    /// Может превышать число установленных битов, если роли
    /// пересекаются; авторитетна битовая карта.
    pub count: u32,
    pub computed_at: SystemTime,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PermissionSet {
    pub fn new() -> Self {
        Self {
            bits: [0; WORDS],
            count: 0,
            computed_at: SystemTime::now(),
        }
    }

    /// Устанавливает бит права. Идентификаторы за пределом карты
    /// молча игнорируются.
    pub fn insert(&mut self, permission_id: u32) {
        let id = permission_id as usize;
        if id >= MAX_PERMISSIONS {
            return;
        }
        self.bits[id / 32] |= 1 << (id % 32);
        self.count += 1;
    }

    pub fn contains(&self, permission_id: u32) -> bool {
        let id = permission_id as usize;
        if id >= MAX_PERMISSIONS {
            return false;
        }
        self.bits[id / 32] & (1 << (id % 32)) != 0
    }

    /// Число различных установленных битов.
    pub fn distinct(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для PermissionSet
////////////////////////////////////////////////////////////////////////////////

impl Default for PermissionSet {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut set = PermissionSet::new();
        assert!(set.is_empty());

        set.insert(1);
        set.insert(31);
        set.insert(32);
        set.insert(1023);

        assert!(set.contains(1));
        assert!(set.contains(31));
        assert!(set.contains(32));
        assert!(set.contains(1023));
        assert!(!set.contains(2));
        assert_eq!(set.distinct(), 4);
    }

    /// Идентификатор за пределом карты игнорируется и не ломает
    /// ни карту, ни счётчик.
    #[test]
    fn test_out_of_range_ignored() {
        let mut set = PermissionSet::new();
        set.insert(MAX_PERMISSIONS as u32);
        set.insert(u32::MAX);

        assert!(set.is_empty());
        assert_eq!(set.count, 0);
        assert!(!set.contains(u32::MAX));
    }

    /// Счётчик считает рёбра: повторная вставка того же права
    /// увеличивает его, но не число битов.
    #[test]
    fn test_count_is_per_edge() {
        let mut set = PermissionSet::new();
        set.insert(3);
        set.insert(3);
        set.insert(4);

        assert_eq!(set.count, 3);
        assert_eq!(set.distinct(), 2);
    }
}
