//! Conversion from an active route to a saveable favorite.

use optimaldn_common::schema::{UserRoute, UserSavedRoute};
use uuid::Uuid;

/// Returns `None` when the route has no legs to summarize.
pub fn to_saved_route(user_id: &str, route: &UserRoute) -> Option<UserSavedRoute> {
    let first = route.legs.first()?;
    let last = route.legs.last()?;

    let line_names: Vec<String> = route.legs.iter().map(|leg| leg.line_name.clone()).collect();
    let stops_names: Vec<String> = route
        .legs
        .iter()
        .flat_map(|leg| leg.stops.iter().cloned())
        .collect();

    Some(UserSavedRoute {
        route_id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        start_point: first.from_name.clone(),
        end_point: last.to_name.clone(),
        transport_mode: first.mode.clone(),
        stops: stops_names.len() as i32,
        estimated_time: route.total_duration,
        line_names,
        stops_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimaldn_common::schema::RouteLeg;

    fn leg(from: &str, to: &str, line: &str, stops: &[&str]) -> RouteLeg {
        RouteLeg {
            from_name: from.to_string(),
            to_name: to.to_string(),
            mode: "tube".to_string(),
            line_name: line.to_string(),
            stops: stops.iter().map(|s| s.to_string()).collect(),
            ..RouteLeg::default()
        }
    }

    #[test]
    fn converts_endpoints_lines_and_stop_counts() {
        let route = UserRoute {
            user_id: "alice".into(),
            total_duration: 25,
            description: String::new(),
            legs: vec![
                leg("Waterloo", "London Bridge", "Jubilee", &["Waterloo", "London Bridge"]),
                leg("London Bridge", "Bank", "Northern", &["Bank"]),
            ],
        };
        let saved = to_saved_route("alice", &route).unwrap();
        assert_eq!(saved.user_id, "alice");
        assert_eq!(saved.start_point, "Waterloo");
        assert_eq!(saved.end_point, "Bank");
        assert_eq!(saved.transport_mode, "tube");
        assert_eq!(saved.estimated_time, 25);
        assert_eq!(saved.line_names, vec!["Jubilee", "Northern"]);
        assert_eq!(saved.stops, 3);
        assert_eq!(saved.stops_names.len(), 3);
    }

    #[test]
    fn routes_without_legs_cannot_be_saved() {
        let route = UserRoute {
            user_id: "alice".into(),
            total_duration: 0,
            description: String::new(),
            legs: vec![],
        };
        assert!(to_saved_route("alice", &route).is_none());
    }

    #[test]
    fn generated_route_ids_are_unique() {
        let route = UserRoute {
            user_id: "alice".into(),
            total_duration: 5,
            description: String::new(),
            legs: vec![leg("A", "B", "Victoria", &["A", "B"])],
        };
        let a = to_saved_route("alice", &route).unwrap();
        let b = to_saved_route("alice", &route).unwrap();
        assert_ne!(a.route_id, b.route_id);
    }
}
