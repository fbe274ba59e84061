use ahash::AHashMap;

/// Session-unique participant id assigned by the server.
pub type UserId = u16;

/// A remote participant on the same canvas.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub cursor_x: i32,
    pub cursor_y: i32,
}

impl User {
    pub fn new(id: UserId, nickname: String) -> Self {
        Self {
            id,
            nickname,
            cursor_x: 0,
            cursor_y: 0,
        }
    }
}

/// Roster of remote participants. Absence of an id means unknown/offline.
#[derive(Debug, Default)]
pub struct UserRoster {
    users: AHashMap<UserId, User>,
}

impl UserRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn add(&mut self, id: UserId, nickname: String) {
        self.users.insert(id, User::new(id, nickname));
    }

    pub fn remove(&mut self, id: UserId) -> Option<User> {
        self.users.remove(&id)
    }

    /// Update a user's last known cursor position. Broadcasts for ids that
    /// already left are ignored.
    pub fn set_cursor(&mut self, id: UserId, x: i32, y: i32) -> bool {
        match self.users.get_mut(&id) {
            Some(user) => {
                user.cursor_x = x;
                user.cursor_y = y;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_lifecycle() {
        let mut roster = UserRoster::new();
        roster.add(3, "ada".into());
        roster.add(7, "grace".into());

        assert!(roster.set_cursor(3, 10, -20));
        assert_eq!(roster.get(3).unwrap().cursor_x, 10);

        assert!(roster.remove(3).is_some());
        assert!(!roster.set_cursor(3, 0, 0));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_rejoin_replaces_user() {
        let mut roster = UserRoster::new();
        roster.add(5, "old".into());
        roster.set_cursor(5, 1, 1);
        roster.add(5, "new".into());

        let user = roster.get(5).unwrap();
        assert_eq!(user.nickname, "new");
        assert_eq!(user.cursor_x, 0);
    }
}
